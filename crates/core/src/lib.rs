//! Shared types, error taxonomy, and configuration for the admin console
//! core. Everything here is plain data — behavior lives in the component
//! crates (`console-access`, `console-registry`, `console-shell`,
//! `console-sync`, `console-audit`, `console-stats`).

pub mod config;
pub mod error;
pub mod types;

pub use config::ConsoleConfig;
pub use error::{ConsoleError, ConsoleResult};
