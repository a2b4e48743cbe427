//! HTTP surface: the terminal API and server bootstrap.

pub mod api;
pub mod server;
