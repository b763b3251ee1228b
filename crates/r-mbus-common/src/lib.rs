//! ---
//! mbus_section: "01-core-functionality"
//! mbus_subsection: "module"
//! mbus_type: "source"
//! mbus_scope: "code"
//! mbus_description: "Shared primitives and utilities for the bus runtime."
//! mbus_version: "v0.0.0-prealpha"
//! mbus_owner: "tbd"
//! ---
//! Core shared primitives for the R-MBUS workspace.
//! This crate exposes configuration loading and logging bootstrap
//! utilities consumed across the workspace.

pub mod config;
pub mod logging;

pub use config::{HostConfig, LoadedHostConfig, LoggingConfig, ModuleConfig};
pub use logging::{init_tracing, LogFormat};
