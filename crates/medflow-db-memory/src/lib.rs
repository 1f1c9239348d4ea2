//! In-memory persistence backend for the MedFlow queue service.
//!
//! This crate provides an implementation of the `ClinicStorage` trait from
//! `medflow-storage` that keeps every record in process memory.
//!
//! # Example
//!
//! ```ignore
//! use medflow_db_memory::InMemoryStorage;
//! use medflow_storage::ClinicStorage;
//!
//! let storage = InMemoryStorage::new();
//! let visit = storage.create_visit(draft).await?;
//! assert_eq!(visit.token, 1);
//! ```

mod storage;

pub use medflow_storage::{ClinicStorage, StorageError};
pub use storage::InMemoryStorage;

/// Type alias for a shareable ClinicStorage instance.
pub type DynClinicStorage = std::sync::Arc<dyn ClinicStorage>;

/// Creates a new in-memory ClinicStorage instance.
pub fn create_clinic_storage() -> DynClinicStorage {
    std::sync::Arc::new(InMemoryStorage::new())
}
