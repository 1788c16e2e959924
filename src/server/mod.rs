//! Server module for Densex
//!
//! Contains configuration, component construction and the HTTP server.
//!
//! # Module Structure
//!
//! - `config`: Configuration structures for all components
//! - `loader`: Configuration loading from files and environment
//! - `init`: Component construction and the HTTP run loop

pub mod config;
mod init;
mod loader;

// Re-export public API
pub use init::{init, run};
pub use loader::load_config;
