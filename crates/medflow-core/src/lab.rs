//! Lab test requests and their results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{CoreError, Result};
use crate::tenant::TenantId;

/// Name used for requests raised automatically from prescription text.
pub const PRESCRIPTION_LAB_TEST_NAME: &str = "Lab Test Request (from Prescription)";

/// Name used when staff order a test without naming it.
pub const MANUAL_LAB_TEST_NAME: &str = "Manual Lab Request";

/// Processing status of a lab test, independent of the visit status.
///
/// `pending -> collection_pending -> processing -> completed`; any
/// non-terminal state may also move to `rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabStatus {
    Pending,
    CollectionPending,
    Processing,
    Completed,
    Rejected,
}

impl LabStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::CollectionPending => "collection_pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::CollectionPending => 1,
            Self::Processing => 2,
            Self::Completed => 3,
            Self::Rejected => 4,
        }
    }

    /// Forward moves only; steps may be skipped.
    pub fn can_transition_to(self, next: LabStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Rejected {
            return true;
        }
        next.rank() > self.rank()
    }

    pub fn transition(self, next: LabStatus) -> Result<LabStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::invalid_transition(self, next))
        }
    }
}

impl fmt::Display for LabStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "collection_pending" => Ok(Self::CollectionPending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            other => Err(CoreError::invalid_status(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleStatus {
    Pending,
    Collected,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabPriority {
    #[default]
    Normal,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabResult {
    pub parameter_name: String,
    pub value: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub reference_range: Option<String>,
    #[serde(default)]
    pub is_abnormal: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabTestRequest {
    pub id: String,
    #[serde(rename = "hospitalId")]
    pub tenant_id: TenantId,
    pub patient_id: String,
    pub test_name: String,
    pub ordered_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub ordered_at: OffsetDateTime,
    pub status: LabStatus,
    pub sample_status: SampleStatus,
    #[serde(default)]
    pub priority: LabPriority,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<LabResult>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

/// Lab order before the gateway assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLabTest {
    pub tenant_id: TenantId,
    pub patient_id: String,
    pub test_name: String,
    pub ordered_by: String,
}

impl NewLabTest {
    pub fn into_request(self, id: String, ordered_at: OffsetDateTime) -> LabTestRequest {
        LabTestRequest {
            id,
            tenant_id: self.tenant_id,
            patient_id: self.patient_id,
            test_name: self.test_name,
            ordered_by: self.ordered_by,
            ordered_at,
            status: LabStatus::Pending,
            sample_status: SampleStatus::Pending,
            priority: LabPriority::Normal,
            results: Vec::new(),
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabTestPatch {
    pub status: Option<LabStatus>,
    pub sample_status: Option<SampleStatus>,
    pub completed_at: Option<OffsetDateTime>,
}

impl LabTestRequest {
    pub fn apply(&mut self, patch: &LabTestPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(sample) = patch.sample_status {
            self.sample_status = sample;
        }
        if let Some(at) = patch.completed_at {
            self.completed_at = Some(at);
        }
    }
}
