//! # relay-server
//!
//! The realtime gateway process: WebSocket transport, topic
//! subscriptions, Postgres change listener, fan-out with per-recipient
//! authorization, and the liveness/cleanup schedulers.
//!
//! | module      | concern                                             |
//! |-------------|-----------------------------------------------------|
//! | `app`       | router assembly and server startup                  |
//! | `registry`  | live connections and the topic index                |
//! | `websocket` | handshake, protocol dispatch, fan-out               |
//! | `listener`  | Postgres LISTEN/NOTIFY change stream                |
//! | `sweeper`   | heartbeat sweep and mirror cleanup                  |
//! | `mirror`    | durable connection mirror                           |
//! | `metrics`   | Prometheus recorder and metric names                |

pub mod app;
pub mod listener;
pub mod metrics;
pub mod mirror;
pub mod registry;
pub mod state;
pub mod sweeper;
pub mod websocket;

#[cfg(test)]
mod testutil;
