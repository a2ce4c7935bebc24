//! WebSocket transport.
//!
//! | module       | concern                                              |
//! |--------------|------------------------------------------------------|
//! | `connection` | handshake, socket reader/writer tasks, teardown      |
//! | `handler`    | envelope dispatch for established connections        |
//! | `fanout`     | event delivery to subscribed connections             |

pub mod connection;
pub mod fanout;
pub mod handler;
