//! Configuration management
//!
//! Listen address, storage path and protocol limits for a node.

pub mod settings;

pub use settings::{Config, GLOBAL_CONFIG, PROTOCOL_VERSION};
