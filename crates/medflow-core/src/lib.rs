pub mod chat;
pub mod error;
pub mod id;
pub mod lab;
pub mod portal;
pub mod roster;
pub mod tenant;
pub mod time;
pub mod visit;

pub use chat::ChatMessage;
pub use error::{CoreError, ErrorCategory, Result};
pub use id::{generate_id, generate_public_token, validate_id};
pub use lab::{
    LabPriority, LabResult, LabStatus, LabTestPatch, LabTestRequest, NewLabTest, SampleStatus,
};
pub use portal::{
    Appointment, AppointmentKind, AppointmentStatus, NewAppointment, NewPharmacyOrder,
    PharmacyOrder, PharmacyOrderStatus,
};
pub use roster::{Doctor, DoctorStatus, Roster};
pub use tenant::{Role, RoleGroup, TenantId};
pub use self::time::{ClinicClock, now_utc};
pub use visit::{NewVisit, PatientVisit, PharmacyState, VisitPatch, VisitStatus};
