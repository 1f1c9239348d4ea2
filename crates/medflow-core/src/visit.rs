//! Patient visit workflow record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::error::CoreError;
use crate::tenant::TenantId;
use crate::time::calendar_date;

pub const DEFAULT_DEPARTMENT: &str = "General";

/// Where a visit currently sits in the hospital workflow.
///
/// Moves between states are not ordered; staff may jump a patient directly
/// from any state to any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisitStatus {
    Waiting,
    WithDoctor,
    Pharmacy,
    Admitted,
    Completed,
    Cancelled,
}

impl VisitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::WithDoctor => "with-doctor",
            Self::Pharmacy => "pharmacy",
            Self::Admitted => "admitted",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisitStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "with-doctor" => Ok(Self::WithDoctor),
            "pharmacy" => Ok(Self::Pharmacy),
            "admitted" => Ok(Self::Admitted),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::invalid_status(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PharmacyState {
    Pending,
    Prepared,
    Delivered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientVisit {
    pub id: String,
    #[serde(rename = "hospitalId")]
    pub tenant_id: TenantId,
    /// Queue number, unique per tenant and department, fixed at creation.
    pub token: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_token: Option<String>,
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub department: String,
    #[serde(default)]
    pub doctor_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    pub status: VisitStatus,
    #[serde(default)]
    pub pharmacy_state: Option<PharmacyState>,
    #[serde(default)]
    pub prescription: Option<String>,
    #[serde(default, with = "calendar_date::option")]
    pub follow_up_date: Option<Date>,
    #[serde(default)]
    pub cost: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub registered_at: OffsetDateTime,
}

impl PatientVisit {
    /// Apply a partial update. Fields absent from the patch are untouched.
    pub fn apply(&mut self, patch: &VisitPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(doctor_id) = &patch.doctor_id {
            self.doctor_id = Some(doctor_id.clone());
        }
        if let Some(state) = patch.pharmacy_state {
            self.pharmacy_state = Some(state);
        }
        if let Some(prescription) = &patch.prescription {
            self.prescription = Some(prescription.clone());
        }
        if let Some(date) = patch.follow_up_date {
            self.follow_up_date = Some(date);
        }
        // A shared link must keep resolving; the first token wins.
        if self.public_token.is_none()
            && let Some(token) = &patch.public_token
        {
            self.public_token = Some(token.clone());
        }
    }
}

/// Registration payload before the gateway assigns id and token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewVisit {
    pub tenant_id: TenantId,
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub department: String,
    pub doctor_id: Option<String>,
    pub reason: Option<String>,
    pub prescription: Option<String>,
    pub cost: f64,
}

impl NewVisit {
    pub fn into_visit(self, id: String, token: u32, registered_at: OffsetDateTime) -> PatientVisit {
        PatientVisit {
            id,
            tenant_id: self.tenant_id,
            token,
            public_token: None,
            name: self.name,
            age: self.age,
            gender: self.gender,
            phone: self.phone,
            address: self.address,
            department: self.department,
            doctor_id: self.doctor_id,
            reason: self.reason,
            status: VisitStatus::Waiting,
            pharmacy_state: None,
            prescription: self.prescription,
            follow_up_date: None,
            cost: self.cost,
            registered_at,
        }
    }
}

/// Partial update of a visit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisitPatch {
    pub status: Option<VisitStatus>,
    pub doctor_id: Option<String>,
    pub pharmacy_state: Option<PharmacyState>,
    pub prescription: Option<String>,
    pub follow_up_date: Option<Date>,
    pub public_token: Option<String>,
}

impl VisitPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    fn visit() -> PatientVisit {
        NewVisit {
            tenant_id: TenantId::new("h1"),
            name: "Asha".into(),
            department: DEFAULT_DEPARTMENT.into(),
            prescription: Some("X".into()),
            ..Default::default()
        }
        .into_visit("v1".into(), 1, datetime!(2024-01-01 09:00 UTC))
    }

    #[test]
    fn test_apply_only_touches_present_fields() {
        let mut v = visit();
        v.apply(&VisitPatch {
            status: Some(VisitStatus::Pharmacy),
            ..Default::default()
        });
        assert_eq!(v.status, VisitStatus::Pharmacy);
        assert_eq!(v.prescription.as_deref(), Some("X"));
        assert_eq!(v.doctor_id, None);
        assert_eq!(v.token, 1);
    }

    #[test]
    fn test_public_token_is_never_replaced() {
        let mut v = visit();
        for token in ["first", "second"] {
            v.apply(&VisitPatch {
                public_token: Some(token.into()),
                ..Default::default()
            });
        }
        assert_eq!(v.public_token.as_deref(), Some("first"));
    }

    #[test]
    fn test_wire_format() {
        let mut v = visit();
        v.apply(&VisitPatch {
            status: Some(VisitStatus::WithDoctor),
            follow_up_date: Some(date!(2024 - 02 - 01)),
            ..Default::default()
        });
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["hospitalId"], "h1");
        assert_eq!(json["status"], "with-doctor");
        assert_eq!(json["followUpDate"], "2024-02-01");
        assert!(json.get("publicToken").is_none());
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!(
            "with-doctor".parse::<VisitStatus>().unwrap(),
            VisitStatus::WithDoctor
        );
        assert!("discharged".parse::<VisitStatus>().is_err());
    }
}
