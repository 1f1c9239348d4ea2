use async_trait::async_trait;
use indexmap::IndexMap;
use medflow_core::{
    Appointment, LabResult, LabStatus, LabTestPatch, LabTestRequest, NewAppointment, NewLabTest,
    NewPharmacyOrder, NewVisit, PatientVisit, PharmacyOrder, TenantId, VisitPatch, generate_id,
    now_utc,
};
use medflow_storage::{ClinicStorage, LabTestQuery, StorageError, VisitQuery};
use parking_lot::RwLock;
use time::OffsetDateTime;

#[derive(Debug, Default)]
struct Tables {
    visits: IndexMap<String, PatientVisit>,
    lab_tests: IndexMap<String, LabTestRequest>,
    appointments: IndexMap<String, Appointment>,
    pharmacy_orders: IndexMap<String, PharmacyOrder>,
}

/// In-memory clinic storage.
///
/// This storage implementation provides:
/// - Tenant-scoped lookups for every record type
/// - Atomic token assignment on visit creation
/// - Atomic check-and-insert for prescription-driven lab requests
///
/// All tables sit behind one `RwLock`. Critical sections are short and
/// synchronous; no guard is ever held across an `.await`.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    tables: RwLock<Tables>,
}

impl InMemoryStorage {
    /// Creates a new, empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored visits across all tenants.
    pub fn visit_count(&self) -> usize {
        self.tables.read().visits.len()
    }

    /// Number of stored lab tests across all tenants.
    pub fn lab_test_count(&self) -> usize {
        self.tables.read().lab_tests.len()
    }
}

fn owned_by<'a, T>(
    record: Option<&'a mut T>,
    tenant: &TenantId,
    tenant_of: impl Fn(&T) -> &TenantId,
) -> Option<&'a mut T> {
    record.filter(|r| tenant_of(r) == tenant)
}

#[async_trait]
impl ClinicStorage for InMemoryStorage {
    async fn count_visits(&self, query: &VisitQuery) -> Result<u64, StorageError> {
        let tables = self.tables.read();
        Ok(tables.visits.values().filter(|v| query.matches(v)).count() as u64)
    }

    async fn create_visit(&self, draft: NewVisit) -> Result<PatientVisit, StorageError> {
        if draft.name.trim().is_empty() {
            return Err(StorageError::invalid_record("visit name must not be empty"));
        }

        let mut tables = self.tables.write();
        let query = VisitQuery::new(draft.tenant_id.clone()).with_department(&draft.department);
        let existing = tables.visits.values().filter(|v| query.matches(v)).count();
        let token = u32::try_from(existing + 1)
            .map_err(|_| StorageError::internal("token sequence exhausted"))?;

        let id = generate_id();
        let visit = draft.into_visit(id.clone(), token, now_utc());
        tables.visits.insert(id, visit.clone());

        tracing::trace!(
            tenant = %visit.tenant_id,
            department = %visit.department,
            token,
            "visit stored"
        );
        Ok(visit)
    }

    async fn find_visit(
        &self,
        tenant: &TenantId,
        id: &str,
    ) -> Result<Option<PatientVisit>, StorageError> {
        let tables = self.tables.read();
        Ok(tables
            .visits
            .get(id)
            .filter(|v| &v.tenant_id == tenant)
            .cloned())
    }

    async fn find_visit_by_public_token(
        &self,
        public_token: &str,
    ) -> Result<Option<PatientVisit>, StorageError> {
        let tables = self.tables.read();
        Ok(tables
            .visits
            .values()
            .find(|v| v.public_token.as_deref() == Some(public_token))
            .cloned())
    }

    async fn list_visits(&self, query: &VisitQuery) -> Result<Vec<PatientVisit>, StorageError> {
        let tables = self.tables.read();
        Ok(tables
            .visits
            .values()
            .filter(|v| query.matches(v))
            .cloned()
            .collect())
    }

    async fn update_visit(
        &self,
        tenant: &TenantId,
        id: &str,
        patch: &VisitPatch,
    ) -> Result<Option<PatientVisit>, StorageError> {
        let mut tables = self.tables.write();
        let Some(visit) = owned_by(tables.visits.get_mut(id), tenant, |v| &v.tenant_id) else {
            return Ok(None);
        };
        visit.apply(patch);
        Ok(Some(visit.clone()))
    }

    async fn create_lab_test(&self, draft: NewLabTest) -> Result<LabTestRequest, StorageError> {
        let mut tables = self.tables.write();
        let id = generate_id();
        let test = draft.into_request(id.clone(), now_utc());
        tables.lab_tests.insert(id, test.clone());
        Ok(test)
    }

    async fn create_lab_test_unless_pending(
        &self,
        draft: NewLabTest,
        since: OffsetDateTime,
    ) -> Result<Option<LabTestRequest>, StorageError> {
        let mut tables = self.tables.write();
        let query = LabTestQuery::new(draft.tenant_id.clone())
            .for_patient(&draft.patient_id)
            .with_status(LabStatus::Pending)
            .ordered_since(since);
        if tables.lab_tests.values().any(|t| query.matches(t)) {
            return Ok(None);
        }

        let id = generate_id();
        let test = draft.into_request(id.clone(), now_utc());
        tables.lab_tests.insert(id, test.clone());
        Ok(Some(test))
    }

    async fn find_lab_test(
        &self,
        tenant: &TenantId,
        id: &str,
    ) -> Result<Option<LabTestRequest>, StorageError> {
        let tables = self.tables.read();
        Ok(tables
            .lab_tests
            .get(id)
            .filter(|t| &t.tenant_id == tenant)
            .cloned())
    }

    async fn list_lab_tests(
        &self,
        query: &LabTestQuery,
    ) -> Result<Vec<LabTestRequest>, StorageError> {
        let tables = self.tables.read();
        Ok(tables
            .lab_tests
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect())
    }

    async fn update_lab_test(
        &self,
        tenant: &TenantId,
        id: &str,
        patch: &LabTestPatch,
    ) -> Result<Option<LabTestRequest>, StorageError> {
        let mut tables = self.tables.write();
        let Some(test) = owned_by(tables.lab_tests.get_mut(id), tenant, |t| &t.tenant_id) else {
            return Ok(None);
        };
        test.apply(patch);
        Ok(Some(test.clone()))
    }

    async fn replace_lab_results(
        &self,
        tenant: &TenantId,
        id: &str,
        results: Vec<LabResult>,
    ) -> Result<Option<LabTestRequest>, StorageError> {
        let mut tables = self.tables.write();
        let Some(test) = owned_by(tables.lab_tests.get_mut(id), tenant, |t| &t.tenant_id) else {
            return Ok(None);
        };
        test.results = results;
        Ok(Some(test.clone()))
    }

    async fn create_appointment(
        &self,
        draft: NewAppointment,
    ) -> Result<Appointment, StorageError> {
        let mut tables = self.tables.write();
        let id = generate_id();
        let appointment = draft.into_appointment(id.clone(), now_utc());
        tables.appointments.insert(id, appointment.clone());
        Ok(appointment)
    }

    async fn create_pharmacy_order(
        &self,
        draft: NewPharmacyOrder,
    ) -> Result<PharmacyOrder, StorageError> {
        if draft.prescription.trim().is_empty() {
            return Err(StorageError::invalid_record("prescription must not be empty"));
        }
        let mut tables = self.tables.write();
        let id = generate_id();
        let order = draft.into_order(id.clone(), now_utc());
        tables.pharmacy_orders.insert(id, order.clone());
        Ok(order)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
