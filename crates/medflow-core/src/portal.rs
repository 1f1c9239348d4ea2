//! Records created from the patient-facing app.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::tenant::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentKind {
    #[default]
    Offline,
    Online,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    #[serde(rename = "hospitalId")]
    pub tenant_id: TenantId,
    pub patient_id: String,
    pub patient_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub doctor_id: Option<String>,
    pub appointment_date: String,
    pub appointment_time: String,
    #[serde(rename = "type")]
    pub kind: AppointmentKind,
    #[serde(default)]
    pub video_link: Option<String>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub tenant_id: TenantId,
    pub patient_id: String,
    pub patient_name: String,
    pub phone: Option<String>,
    pub doctor_id: Option<String>,
    pub appointment_date: String,
    pub appointment_time: String,
    pub kind: AppointmentKind,
    pub notes: Option<String>,
}

impl NewAppointment {
    /// Online consultations get a meeting room named after the tenant and record id.
    pub fn into_appointment(self, id: String, created_at: OffsetDateTime) -> Appointment {
        let video_link = match self.kind {
            AppointmentKind::Online => Some(format!(
                "https://meet.jit.si/MedFlow-{}-{}",
                self.tenant_id,
                id.split('-').next().unwrap_or(&id)
            )),
            AppointmentKind::Offline => None,
        };
        Appointment {
            id,
            tenant_id: self.tenant_id,
            patient_id: self.patient_id,
            patient_name: self.patient_name,
            phone: self.phone,
            doctor_id: self.doctor_id,
            appointment_date: self.appointment_date,
            appointment_time: self.appointment_time,
            kind: self.kind,
            video_link,
            status: AppointmentStatus::Scheduled,
            notes: self.notes,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PharmacyOrderStatus {
    Pending,
    Ready,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PharmacyOrder {
    pub id: String,
    #[serde(rename = "hospitalId")]
    pub tenant_id: TenantId,
    pub patient_id: String,
    pub patient_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub prescription: String,
    pub status: PharmacyOrderStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub order_date: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPharmacyOrder {
    pub tenant_id: TenantId,
    pub patient_id: String,
    pub patient_name: String,
    pub phone: Option<String>,
    pub prescription: String,
}

impl NewPharmacyOrder {
    pub fn into_order(self, id: String, order_date: OffsetDateTime) -> PharmacyOrder {
        PharmacyOrder {
            id,
            tenant_id: self.tenant_id,
            patient_id: self.patient_id,
            patient_name: self.patient_name,
            phone: self.phone,
            prescription: self.prescription,
            status: PharmacyOrderStatus::Pending,
            order_date,
        }
    }
}
