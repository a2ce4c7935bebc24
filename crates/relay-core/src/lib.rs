//! # relay-core
//!
//! Foundation types and utilities shared by all Relay crates:
//!
//! - **Wire protocol**: [`envelope::Envelope`] (Phoenix-style message
//!   envelope), [`envelope::ReplyStatus`], and close codes
//! - **Change events**: [`event::ChangeEvent`] decoded from database
//!   notifications, plus topic derivation
//! - **Branded IDs**: [`ids::ConnectionId`], [`ids::SocketId`]
//! - **Errors**: [`errors::HandshakeError`] via `thiserror`
//! - **Logging**: [`logging::init`] tracing-subscriber setup
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other relay crates.

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod event;
pub mod ids;
pub mod logging;
