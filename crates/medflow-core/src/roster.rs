//! Static doctor roster used for auto-assignment and display names.

use serde::{Deserialize, Serialize};

/// Name shown when a doctor id is unknown.
pub const FALLBACK_DOCTOR_NAME: &str = "Doctor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoctorStatus {
    #[default]
    Available,
    Busy,
    Away,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: String,
    pub name: String,
    pub department: String,
    #[serde(default)]
    pub status: DoctorStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    doctors: Vec<Doctor>,
}

impl Roster {
    pub fn new(doctors: Vec<Doctor>) -> Self {
        Self { doctors }
    }

    /// The roster the hospital shipped with before it was made configurable.
    pub fn builtin() -> Self {
        let doctor = |id: &str, name: &str, department: &str| Doctor {
            id: id.into(),
            name: name.into(),
            department: department.into(),
            status: DoctorStatus::Available,
        };
        Self::new(vec![
            doctor("1", "Dr. Asha Patel", "General"),
            doctor("2", "Dr. Rajesh Singh", "Orthopedics"),
            doctor("3", "Dr. Nisha Rao", "Gynecology"),
            doctor("4", "Dr. Vikram Shah", "Cardiology"),
        ])
    }

    pub fn doctors(&self) -> &[Doctor] {
        &self.doctors
    }

    pub fn find(&self, id: &str) -> Option<&Doctor> {
        self.doctors.iter().find(|d| d.id == id)
    }

    /// First available doctor in `department`.
    pub fn first_available(&self, department: &str) -> Option<&Doctor> {
        self.doctors
            .iter()
            .find(|d| d.department == department && d.status == DoctorStatus::Available)
    }

    pub fn display_name(&self, id: Option<&str>) -> String {
        id.and_then(|id| self.find(id))
            .map(|d| d.name.clone())
            .unwrap_or_else(|| FALLBACK_DOCTOR_NAME.to_string())
    }
}
