//! Query types for the persistence gateway.
//!
//! Every query carries the tenant it is scoped to; there is no way to build
//! a cross-tenant filter through this API.

use medflow_core::{LabStatus, LabTestRequest, PatientVisit, TenantId, VisitStatus};
use time::OffsetDateTime;

/// Filter over patient visits of one tenant.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitQuery {
    pub tenant_id: TenantId,
    pub department: Option<String>,
    pub status: Option<VisitStatus>,
    pub registered_since: Option<OffsetDateTime>,
}

impl VisitQuery {
    #[must_use]
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            department: None,
            status: None,
            registered_since: None,
        }
    }

    #[must_use]
    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: VisitStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn registered_since(mut self, since: OffsetDateTime) -> Self {
        self.registered_since = Some(since);
        self
    }

    /// Returns `true` if the visit satisfies every set criterion.
    pub fn matches(&self, visit: &PatientVisit) -> bool {
        visit.tenant_id == self.tenant_id
            && self
                .department
                .as_deref()
                .is_none_or(|d| visit.department == d)
            && self.status.is_none_or(|s| visit.status == s)
            && self
                .registered_since
                .is_none_or(|since| visit.registered_at >= since)
    }
}

/// Filter over lab test requests of one tenant.
#[derive(Debug, Clone, PartialEq)]
pub struct LabTestQuery {
    pub tenant_id: TenantId,
    pub patient_id: Option<String>,
    pub status: Option<LabStatus>,
    pub ordered_since: Option<OffsetDateTime>,
}

impl LabTestQuery {
    #[must_use]
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            patient_id: None,
            status: None,
            ordered_since: None,
        }
    }

    #[must_use]
    pub fn for_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: LabStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn ordered_since(mut self, since: OffsetDateTime) -> Self {
        self.ordered_since = Some(since);
        self
    }

    pub fn matches(&self, test: &LabTestRequest) -> bool {
        test.tenant_id == self.tenant_id
            && self
                .patient_id
                .as_deref()
                .is_none_or(|p| test.patient_id == p)
            && self.status.is_none_or(|s| test.status == s)
            && self
                .ordered_since
                .is_none_or(|since| test.ordered_at >= since)
    }
}
