//! fleet-notify: notification cache and push channel coordination for the
//! fleet trips client.
//!
//! `session::Session` wires the pieces together; the binary in `main.rs` is a
//! thin CLI over it.

pub mod api;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod notification;
pub mod platform;
pub mod session;
pub mod store;
