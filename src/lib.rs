//! Validation of zipped shapefile datasets against a fixed publishing
//! checklist: complete file set, WGS84 geographic coordinates in decimal
//! degrees, and 2D geometry.

pub mod config;
pub mod models;
pub mod routes;
pub mod services;

pub use config::{format_bytes, read_max_size_config, EngineConfig, ServerConfig};
pub use models::{AppError, ArchiveError, Category, Finding, Scope, Severity, ValidationResult};
pub use routes::{build_router, AppState};
pub use services::{ArchiveInput, ValidationService};

/// Validates one archive using limits read from the environment.
pub fn validate(input: impl Into<ArchiveInput>) -> Result<ValidationResult, ArchiveError> {
    ValidationService::new(EngineConfig::from_env()).validate(input)
}
