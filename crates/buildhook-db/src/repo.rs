//! Build record repositories.

pub mod build;
pub mod memory;

pub use build::PgBuildRepo;
pub use memory::MemoryBuildRepo;
