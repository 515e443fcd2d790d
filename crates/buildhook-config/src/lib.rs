//! Configuration for buildhook.
//!
//! This crate handles:
//! - Package configuration (`.packit.kdl`) declaring the jobs of a repository
//! - Service configuration read from the environment

pub mod error;
pub mod package;
pub mod service;

pub use error::{ConfigError, ConfigResult};
pub use package::{load_package_config, parse_package_config};
pub use service::{Deployment, ServiceConfig};
