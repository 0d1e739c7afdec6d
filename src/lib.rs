//! Flowchart View: draws the dialog open in Parley as a node-and-edge chart
//! in a host panel and keeps selection in sync both ways.

pub mod config;
pub mod demo;
pub mod fingerprint;
pub mod palette;
pub mod plugin;
pub mod render;
pub mod schema;
pub mod sync;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
