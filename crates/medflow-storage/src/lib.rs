//! # medflow-storage
//!
//! The persistence gateway for the MedFlow queue service.
//!
//! This crate defines the trait and query types every storage backend
//! implements. It does not contain any implementations; the in-memory backend
//! lives in `medflow-db-memory`.
//!
//! All reads and writes are scoped by tenant. A lookup for a record owned by
//! another hospital returns `None`, exactly as if the record did not exist.

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::ClinicStorage;
pub use types::{LabTestQuery, VisitQuery};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared storage trait object.
pub type DynStorage = std::sync::Arc<dyn ClinicStorage>;
