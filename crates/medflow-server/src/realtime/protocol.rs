//! Wire format for the `/ws` endpoint.
//!
//! Every frame is a JSON text message `{"event": "<name>", "data": {...}}`.

use medflow_core::{
    Appointment, ChatMessage, LabTestRequest, PatientVisit, PharmacyOrder, PharmacyState, Role,
    VisitStatus,
};
use serde::{Deserialize, Deserializer, Serialize, de::IgnoredAny};
use serde_json::Value;

/// Client-to-server intents.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    Join(JoinPayload),
    JoinPatientRoom(PatientRoomPayload),
    RegisterPatient(RegisterPatientPayload),
    MovePatient(MovePatientPayload),
    UpdatePrescription(UpdatePrescriptionPayload),
    CreateLabRequest(CreateLabRequestPayload),
    SendChatMessage(ChatPayload),
}

/// Why an inbound text frame did not become a [`ClientMessage`].
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("unreadable frame: {0}")]
    Unreadable(serde_json::Error),
    #[error("unknown event {0:?}")]
    UnknownEvent(String),
    /// A known intent whose `data` does not fit its payload.
    #[error("invalid {intent} data: {source}")]
    Malformed {
        intent: &'static str,
        source: serde_json::Error,
    },
}

/// Event names [`ClientMessage`] understands.
const INTENTS: &[&str] = &[
    "join",
    "join-patient-room",
    "register-patient",
    "move-patient",
    "update-prescription",
    "create-lab-request",
    "send-chat-message",
];

impl ClientMessage {
    /// Parses a text frame, telling a malformed known intent apart from
    /// noise so the former can be answered.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        #[derive(Deserialize)]
        struct Envelope {
            event: String,
            #[serde(default)]
            data: Value,
        }

        let envelope: Envelope = serde_json::from_str(text).map_err(FrameError::Unreadable)?;
        let Some(intent) = INTENTS
            .iter()
            .copied()
            .find(|name| *name == envelope.event)
        else {
            return Err(FrameError::UnknownEvent(envelope.event));
        };
        serde_json::from_value(serde_json::json!({ "event": intent, "data": envelope.data }))
            .map_err(|source| FrameError::Malformed { intent, source })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::JoinPatientRoom(_) => "join-patient-room",
            Self::RegisterPatient(_) => "register-patient",
            Self::MovePatient(_) => "move-patient",
            Self::UpdatePrescription(_) => "update-prescription",
            Self::CreateLabRequest(_) => "create-lab-request",
            Self::SendChatMessage(_) => "send-chat-message",
        }
    }
}

/// Declared role and hospital. Advisory only; the session decides, so any
/// shape is accepted: `{"role", "hospitalId"}`, a bare role string, or
/// nothing at all.
#[derive(Debug, Clone, Default)]
pub struct JoinPayload {
    pub role: Option<String>,
    pub hospital_id: Option<String>,
}

impl<'de> Deserialize<'de> for JoinPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Declared {
            Object {
                #[serde(default)]
                role: Option<String>,
                #[serde(default, rename = "hospitalId")]
                hospital_id: Option<String>,
            },
            Role(String),
            Other(IgnoredAny),
        }

        Ok(match Declared::deserialize(deserializer)? {
            Declared::Object { role, hospital_id } => Self { role, hospital_id },
            Declared::Role(role) => Self {
                role: Some(role),
                hospital_id: None,
            },
            Declared::Other(_) => Self::default(),
        })
    }
}

/// Accepts `34`, `"34"`, `""` or `null`; form inputs arrive as strings.
fn number_or_text<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + std::str::FromStr,
    T::Err: std::fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Number(T),
        Text(String),
    }

    match Option::<Raw<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse()
                .map(Some)
                .map_err(|e| serde::de::Error::custom(format!("invalid number {text:?}: {e}")))
        }
    }
}

/// Either a bare hospital id or an object carrying a visit's public token.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PatientRoomPayload {
    HospitalId(String),
    Scoped {
        #[serde(default, rename = "hospitalId")]
        hospital_id: Option<String>,
        #[serde(default, rename = "visitToken")]
        visit_token: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPatientPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "number_or_text")]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub doctor_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "number_or_text")]
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePatientPayload {
    pub id: String,
    #[serde(default)]
    pub status: Option<VisitStatus>,
    #[serde(default)]
    pub doctor_id: Option<String>,
    #[serde(default)]
    pub pharmacy_state: Option<PharmacyState>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePrescriptionPayload {
    pub id: String,
    #[serde(default)]
    pub prescription: String,
    /// `YYYY-MM-DD`; blank means none
    #[serde(default)]
    pub follow_up_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLabRequestPayload {
    pub patient_id: String,
    #[serde(default)]
    pub test_name: Option<String>,
    #[serde(default)]
    pub doctor_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatPayload {
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub text: String,
}

/// Server-to-client events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    PatientRegistered(PatientVisit),
    QueueUpdated {
        patient: PatientVisit,
    },
    PatientUpdated(PatientVisit),
    PrescriptionUpdated(PatientVisit),
    LabRequestCreated(LabRequestOutcome),
    LabUpdate(LabTestRequest),
    CurrentTokenUpdate {
        token: u32,
        #[serde(rename = "doctorId")]
        doctor_id: Option<String>,
    },
    ChatHistory(Vec<ChatMessage>),
    ChatMessage(ChatMessage),
    NewAppointment(Appointment),
    NewPharmacyOrder(PharmacyOrder),
    PatientRegistrationError {
        message: String,
    },
    IntentRejected {
        intent: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PatientRegistered(_) => "patient-registered",
            Self::QueueUpdated { .. } => "queue-updated",
            Self::PatientUpdated(_) => "patient-updated",
            Self::PrescriptionUpdated(_) => "prescription-updated",
            Self::LabRequestCreated(_) => "lab-request-created",
            Self::LabUpdate(_) => "lab-update",
            Self::CurrentTokenUpdate { .. } => "current-token-update",
            Self::ChatHistory(_) => "chat-history",
            Self::ChatMessage(_) => "chat-message",
            Self::NewAppointment(_) => "new-appointment",
            Self::NewPharmacyOrder(_) => "new-pharmacy-order",
            Self::PatientRegistrationError { .. } => "patient-registration-error",
            Self::IntentRejected { .. } => "intent-rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabRequestOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LabRequestOutcome {
    pub fn created(test_id: String) -> Self {
        Self {
            success: true,
            test_id: Some(test_id),
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            test_id: None,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_move_patient() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "event": "move-patient",
            "data": {"id": "v1", "status": "with-doctor", "doctorId": "2"}
        }))
        .unwrap();
        let ClientMessage::MovePatient(p) = msg else {
            panic!("wrong variant");
        };
        assert_eq!(p.status, Some(VisitStatus::WithDoctor));
        assert_eq!(p.doctor_id.as_deref(), Some("2"));
        assert!(p.pharmacy_state.is_none());
    }

    #[test]
    fn test_patient_room_accepts_bare_string_and_object() {
        let bare: ClientMessage = serde_json::from_value(json!({
            "event": "join-patient-room", "data": "h1"
        }))
        .unwrap();
        assert!(matches!(
            bare,
            ClientMessage::JoinPatientRoom(PatientRoomPayload::HospitalId(ref h)) if h == "h1"
        ));

        let scoped: ClientMessage = serde_json::from_value(json!({
            "event": "join-patient-room", "data": {"visitToken": "abc"}
        }))
        .unwrap();
        assert!(matches!(
            scoped,
            ClientMessage::JoinPatientRoom(PatientRoomPayload::Scoped { visit_token: Some(_), .. })
        ));
    }

    #[test]
    fn test_unknown_event_is_an_error() {
        let res: Result<ClientMessage, _> =
            serde_json::from_value(json!({"event": "drop-tables", "data": {}}));
        assert!(res.is_err());
    }

    #[test]
    fn test_register_accepts_form_strings() {
        let msg = ClientMessage::parse(
            r#"{"event":"register-patient","data":{"name":"Asha","age":"34","cost":" ","phone":"+91"}}"#,
        )
        .unwrap();
        let ClientMessage::RegisterPatient(p) = msg else {
            panic!("wrong variant");
        };
        assert_eq!(p.age, Some(34));
        assert_eq!(p.cost, None);

        let msg = ClientMessage::parse(
            r#"{"event":"register-patient","data":{"name":"Asha","age":41,"cost":"250.5"}}"#,
        )
        .unwrap();
        let ClientMessage::RegisterPatient(p) = msg else {
            panic!("wrong variant");
        };
        assert_eq!(p.age, Some(41));
        assert_eq!(p.cost, Some(250.5));
    }

    #[test]
    fn test_join_accepts_any_declared_shape() {
        for frame in [
            r#"{"event":"join","data":"lab"}"#,
            r#"{"event":"join"}"#,
            r#"{"event":"join","data":null}"#,
            r#"{"event":"join","data":{"role":7}}"#,
        ] {
            assert!(
                matches!(ClientMessage::parse(frame), Ok(ClientMessage::Join(_))),
                "{frame}"
            );
        }
        let Ok(ClientMessage::Join(declared)) =
            ClientMessage::parse(r#"{"event":"join","data":"lab"}"#)
        else {
            panic!("wrong variant");
        };
        assert_eq!(declared.role.as_deref(), Some("lab"));
    }

    #[test]
    fn test_parse_classifies_failures() {
        assert!(matches!(
            ClientMessage::parse("not json"),
            Err(FrameError::Unreadable(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"event":"drop-tables"}"#),
            Err(FrameError::UnknownEvent(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"event":"register-patient","data":{"name":"A","age":"old"}}"#),
            Err(FrameError::Malformed { intent: "register-patient", .. })
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"event":"move-patient","data":{}}"#),
            Err(FrameError::Malformed { intent: "move-patient", .. })
        ));
    }

    #[test]
    fn test_server_message_shape() {
        let msg = ServerMessage::CurrentTokenUpdate {
            token: 4,
            doctor_id: Some("2".into()),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["event"], msg.name());
        assert_eq!(value["data"], json!({"token": 4, "doctorId": "2"}));

        let rejected = ServerMessage::LabRequestCreated(LabRequestOutcome::failed("nope"));
        let value = serde_json::to_value(&rejected).unwrap();
        assert_eq!(value["data"], json!({"success": false, "message": "nope"}));
    }
}
