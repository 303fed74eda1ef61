//! Domain model for allochud
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{AllocationRecord, BenchmarkKey, ByteSize, ModuleId, PackageId, SourceLocation};

pub use errors::{
    CacheError, DiscoveryError, ExecutionError, ExportError, NavigationError, ProfileError,
    ToolchainError,
};
