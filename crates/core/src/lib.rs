//! duodeck core
//!
//! Shared plumbing for the duodeck console: the contract with the audio-graph
//! runtime, an offline runtime for headless sessions, observer lists,
//! configuration, and the async module system.

pub use config::{ConfigError, ConfigManager, ConfigSchema};
pub use graph::{
    build_chain, normalize_level, AudioBuffer, AudioGraph, GraphError, NodeId, NodeKind,
    OfflineGraph, Param, ParamValue, ParamWrite,
};
pub use messages::{ConsoleCommand, CrossfadeLaw, Settings};
// Async module system exports
pub use modules::{AsyncModule, ModuleEvent, ModuleId, ModuleManager, ModuleMessage};
pub use observer::{SubscriptionId, Subscribers};

mod config;
pub mod graph;
pub mod messages;
mod modules;
pub mod observer;
