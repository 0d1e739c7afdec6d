//! Client library for Parley plugins.
//!
//! A plugin is a separate process the host launches with `PARLEY_RPC_PORT` in
//! its environment. It talks to the host over newline-delimited JSON-RPC 2.0
//! on that local port: calls go out through a [`client::HostClient`], host
//! notifications (panel clicks, dialog changes, shutdown) come back as
//! [`message::HostEvent`]s.

pub mod client;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod logger;
pub mod message;
pub mod plugin_runtime;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_util;

pub use client::{HostClient, RpcHostClient};
pub use error::{HostError, HostResult};
