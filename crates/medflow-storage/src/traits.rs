//! The persistence gateway consumed by the event router.

use async_trait::async_trait;
use medflow_core::{
    Appointment, LabResult, LabTestPatch, LabTestRequest, NewAppointment, NewLabTest,
    NewPharmacyOrder, NewVisit, PatientVisit, PharmacyOrder, TenantId, VisitPatch,
};
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::types::{LabTestQuery, VisitQuery};

/// Tenant-scoped create/read/update operations over clinic records.
///
/// Every lookup takes the caller's tenant; a record that exists under another
/// tenant is reported exactly like a missing one. Implementations must be
/// thread-safe (`Send + Sync`) and must not block the async runtime.
///
/// # Example
///
/// ```ignore
/// async fn current_token(storage: &dyn ClinicStorage, tenant: &TenantId, id: &str)
///     -> Result<u32, StorageError>
/// {
///     storage
///         .find_visit(tenant, id)
///         .await?
///         .map(|v| v.token)
///         .ok_or_else(|| StorageError::not_found("PatientVisit", id))
/// }
/// ```
#[async_trait]
pub trait ClinicStorage: Send + Sync {
    // ==================== Visits ====================

    /// Counts visits matching the query.
    async fn count_visits(&self, query: &VisitQuery) -> Result<u64, StorageError>;

    /// Creates a visit and assigns its queue token.
    ///
    /// The token is `count(visits in tenant + department) + 1`, computed and
    /// inserted as one atomic step so concurrent registrations never share a
    /// token.
    async fn create_visit(&self, draft: NewVisit) -> Result<PatientVisit, StorageError>;

    /// Reads a visit owned by `tenant`.
    async fn find_visit(
        &self,
        tenant: &TenantId,
        id: &str,
    ) -> Result<Option<PatientVisit>, StorageError>;

    /// Reads a visit by its public sharing token. Not tenant-scoped: the
    /// token itself is the capability.
    async fn find_visit_by_public_token(
        &self,
        public_token: &str,
    ) -> Result<Option<PatientVisit>, StorageError>;

    /// Lists visits ordered by registration time.
    async fn list_visits(&self, query: &VisitQuery) -> Result<Vec<PatientVisit>, StorageError>;

    /// Applies a partial update; returns `None` if the visit is not owned by `tenant`.
    async fn update_visit(
        &self,
        tenant: &TenantId,
        id: &str,
        patch: &VisitPatch,
    ) -> Result<Option<PatientVisit>, StorageError>;

    // ==================== Lab tests ====================

    async fn create_lab_test(&self, draft: NewLabTest) -> Result<LabTestRequest, StorageError>;

    /// Creates the test unless a pending test for the same patient was ordered
    /// at or after `since`. Check and insert happen atomically.
    ///
    /// Returns `None` when an existing pending test suppressed the insert.
    async fn create_lab_test_unless_pending(
        &self,
        draft: NewLabTest,
        since: OffsetDateTime,
    ) -> Result<Option<LabTestRequest>, StorageError>;

    async fn find_lab_test(
        &self,
        tenant: &TenantId,
        id: &str,
    ) -> Result<Option<LabTestRequest>, StorageError>;

    async fn list_lab_tests(
        &self,
        query: &LabTestQuery,
    ) -> Result<Vec<LabTestRequest>, StorageError>;

    async fn update_lab_test(
        &self,
        tenant: &TenantId,
        id: &str,
        patch: &LabTestPatch,
    ) -> Result<Option<LabTestRequest>, StorageError>;

    /// Deletes every stored result of the test, then stores `results`.
    async fn replace_lab_results(
        &self,
        tenant: &TenantId,
        id: &str,
        results: Vec<LabResult>,
    ) -> Result<Option<LabTestRequest>, StorageError>;

    // ==================== Patient app ====================

    async fn create_appointment(
        &self,
        draft: NewAppointment,
    ) -> Result<Appointment, StorageError>;

    async fn create_pharmacy_order(
        &self,
        draft: NewPharmacyOrder,
    ) -> Result<PharmacyOrder, StorageError>;

    // ==================== Metadata ====================

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
