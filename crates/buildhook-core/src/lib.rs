//! Core domain types and collaborator traits for buildhook.
//!
//! This crate contains:
//! - Inbound events and build-service callbacks
//! - Job and package configuration types
//! - SRPM and target build records with the build status state machine
//! - Traits for the forge, build service, storage, status reporting,
//!   task submission and telemetry

pub mod build;
pub mod error;
pub mod event;
pub mod forge;
pub mod job;
pub mod report;
pub mod service;
pub mod store;
pub mod task;
pub mod telemetry;

pub use error::{Error, Result};
