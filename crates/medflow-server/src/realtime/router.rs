//! Authorizes intents, applies them through the storage gateway and fans
//! the results out to the right groups.

use std::sync::Arc;

use medflow_core::{
    ChatMessage, ClinicClock, NewLabTest, NewVisit, RoleGroup, Roster, TenantId, VisitPatch,
    VisitStatus, generate_public_token, lab, now_utc, time::parse_date,
    visit::DEFAULT_DEPARTMENT,
};
use medflow_storage::DynStorage;

use super::access::{Requirement, authorize};
use super::chat::ChatRoom;
use super::error::IntentError;
use super::protocol::{
    ChatPayload, ClientMessage, CreateLabRequestPayload, FrameError, JoinPayload, LabRequestOutcome,
    MovePatientPayload, PatientRoomPayload, RegisterPatientPayload, ServerMessage,
    UpdatePrescriptionPayload,
};
use super::rooms::{ConnectionId, Fanout, Group, RoomRegistry};
use super::side_effects::{SideEffects, is_shareable_prescription, mentions_lab_work};
use crate::session::{DynSessionStore, Session};

const FRONT_DESK: &[RoleGroup] = &[RoleGroup::Doctors, RoleGroup::Reception];
const QUEUE_WATCHERS: &[RoleGroup] = &[
    RoleGroup::Doctors,
    RoleGroup::Reception,
    RoleGroup::Pharmacy,
];

/// Behaviour switches for the router.
#[derive(Debug, Clone, Copy)]
pub struct RouterSettings {
    pub allow_anonymous_patient_rooms: bool,
    pub global_queue_broadcasts: bool,
    pub revalidate_sessions: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            allow_anonymous_patient_rooms: true,
            global_queue_broadcasts: false,
            revalidate_sessions: false,
        }
    }
}

/// Per-connection state seen by the router.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub id: ConnectionId,
    /// Resolved once at upgrade.
    pub session: Option<Session>,
}

impl ConnectionContext {
    pub fn new(id: ConnectionId, session: Option<Session>) -> Self {
        Self { id, session }
    }
}

pub struct EventRouter {
    storage: DynStorage,
    rooms: Arc<RoomRegistry>,
    chat: ChatRoom,
    effects: SideEffects,
    sessions: DynSessionStore,
    roster: Arc<Roster>,
    clock: ClinicClock,
    settings: RouterSettings,
}

impl EventRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: DynStorage,
        rooms: Arc<RoomRegistry>,
        chat: ChatRoom,
        effects: SideEffects,
        sessions: DynSessionStore,
        roster: Arc<Roster>,
        clock: ClinicClock,
        settings: RouterSettings,
    ) -> Self {
        Self {
            storage,
            rooms,
            chat,
            effects,
            sessions,
            roster,
            clock,
            settings,
        }
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    pub fn chat(&self) -> &ChatRoom {
        &self.chat
    }

    /// Handles one inbound text frame. Unreadable frames and unknown events
    /// are dropped; a known intent with bad data is rejected to the caller.
    pub async fn handle_frame(&self, conn: &mut ConnectionContext, text: &str) {
        match ClientMessage::parse(text) {
            Ok(message) => self.handle(conn, message).await,
            Err(FrameError::Malformed { intent, source }) => {
                self.reject(
                    conn,
                    intent,
                    IntentError::validation(format!("Invalid request data: {source}")),
                );
            }
            Err(e) => {
                tracing::debug!(connection_id = %conn.id, error = %e, "frame ignored");
            }
        }
    }

    /// Handles one inbound intent. Never fails: refusals go back to the
    /// caller as events.
    pub async fn handle(&self, conn: &mut ConnectionContext, message: ClientMessage) {
        let intent = message.name();
        tracing::debug!(connection_id = %conn.id, intent, "intent received");

        let result = match message {
            ClientMessage::Join(payload) => {
                self.join(conn, payload);
                Ok(())
            }
            ClientMessage::JoinPatientRoom(payload) => self.join_patient_room(conn, payload).await,
            ClientMessage::RegisterPatient(payload) => {
                self.revalidate(conn).await;
                self.register_patient(conn, payload).await
            }
            ClientMessage::MovePatient(payload) => {
                self.revalidate(conn).await;
                self.move_patient(conn, payload).await
            }
            ClientMessage::UpdatePrescription(payload) => {
                self.revalidate(conn).await;
                self.update_prescription(conn, payload).await
            }
            ClientMessage::CreateLabRequest(payload) => {
                self.revalidate(conn).await;
                self.create_lab_request(conn, payload).await
            }
            ClientMessage::SendChatMessage(payload) => {
                self.send_chat_message(conn, payload).await;
                Ok(())
            }
        };

        if let Err(err) = result {
            self.reject(conn, intent, err);
        }
    }

    /// Drops the cached session if the store no longer knows it.
    async fn revalidate(&self, conn: &mut ConnectionContext) {
        if !self.settings.revalidate_sessions {
            return;
        }
        let Some(session) = &conn.session else {
            return;
        };
        if self.sessions.resolve(&session.token).await.is_none() {
            tracing::info!(
                connection_id = %conn.id,
                user = %session.username,
                "session no longer valid, connection downgraded"
            );
            conn.session = None;
        }
    }

    fn reject(&self, conn: &ConnectionContext, intent: &'static str, err: IntentError) {
        if err.is_internal() {
            tracing::warn!(connection_id = %conn.id, intent, error = %err, "intent failed");
        } else {
            tracing::debug!(connection_id = %conn.id, intent, error = %err, "intent rejected");
        }

        let message = match intent {
            "register-patient" => ServerMessage::PatientRegistrationError {
                message: err.to_string(),
            },
            "create-lab-request" => {
                ServerMessage::LabRequestCreated(LabRequestOutcome::failed(err.to_string()))
            }
            _ => ServerMessage::IntentRejected {
                intent: intent.to_string(),
                message: err.to_string(),
            },
        };
        self.rooms.send_to(conn.id, &message);
    }

    /// Where hospital-wide queue events go.
    fn queue_scope(&self, tenant: &TenantId, message: &ServerMessage) {
        if self.settings.global_queue_broadcasts {
            self.rooms.emit_all(message);
        } else {
            self.rooms.emit(&Fanout::new().tenant(tenant), message);
        }
    }

    // ==================== Rooms ====================

    /// Joins the session's role and hospital groups. The declared values are ignored.
    pub fn join(&self, conn: &ConnectionContext, declared: JoinPayload) {
        let Some(session) = &conn.session else {
            tracing::debug!(connection_id = %conn.id, "join without session ignored");
            return;
        };

        if let Some(claimed) = declared.hospital_id.as_deref()
            && claimed != session.tenant_id.as_str()
        {
            tracing::warn!(
                connection_id = %conn.id,
                claimed,
                tenant = %session.tenant_id,
                "declared hospital differs from session, using session"
            );
        }

        let mut groups = vec![Group::tenant(&session.tenant_id)];
        if let Some(role) = session.role.group() {
            groups.push(Group::role(&session.tenant_id, role));
        }
        self.rooms.join(conn.id, groups);
        tracing::debug!(
            connection_id = %conn.id,
            tenant = %session.tenant_id,
            role = %session.role,
            "connection joined staff rooms"
        );
    }

    pub async fn join_patient_room(
        &self,
        conn: &ConnectionContext,
        payload: PatientRoomPayload,
    ) -> Result<(), IntentError> {
        let (hospital_id, visit_token) = match payload {
            PatientRoomPayload::HospitalId(id) => (Some(id), None),
            PatientRoomPayload::Scoped {
                hospital_id,
                visit_token,
            } => (hospital_id, visit_token),
        };

        let tenant = if let Some(token) = visit_token.filter(|t| !t.is_empty()) {
            let visit = self
                .storage
                .find_visit_by_public_token(&token)
                .await?
                .ok_or(IntentError::NotFound)?;
            visit.tenant_id
        } else if self.settings.allow_anonymous_patient_rooms {
            let claimed = hospital_id.unwrap_or_default();
            TenantId::parse(&claimed).map_err(|e| IntentError::validation(e.to_string()))?
        } else {
            return Err(IntentError::validation(
                "A visit token is required to follow a hospital queue",
            ));
        };

        self.rooms.join(conn.id, [Group::tenant(&tenant)]);
        tracing::debug!(connection_id = %conn.id, tenant = %tenant, "connection joined patient room");
        Ok(())
    }

    // ==================== Intents ====================

    pub async fn register_patient(
        &self,
        conn: &ConnectionContext,
        payload: RegisterPatientPayload,
    ) -> Result<(), IntentError> {
        let session = authorize(conn.session.as_ref(), Requirement::Staff)?;

        let name = payload.name.trim();
        if name.is_empty() {
            return Err(IntentError::validation("Patient name is required"));
        }
        let department = payload
            .department
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DEFAULT_DEPARTMENT.to_string());
        let doctor_id = payload
            .doctor_id
            .filter(|d| !d.trim().is_empty())
            .or_else(|| {
                self.roster
                    .first_available(&department)
                    .map(|d| d.id.clone())
            });

        let visit = self
            .storage
            .create_visit(NewVisit {
                tenant_id: session.tenant_id.clone(),
                name: name.to_string(),
                age: payload.age,
                gender: payload.gender,
                phone: payload.phone,
                address: payload.address,
                department,
                doctor_id,
                reason: payload.reason,
                prescription: None,
                cost: payload.cost.unwrap_or_default(),
            })
            .await?;

        tracing::info!(
            tenant = %visit.tenant_id,
            visit_id = %visit.id,
            token = visit.token,
            department = %visit.department,
            "patient registered"
        );

        self.effects.registration_confirmed(&visit);

        self.rooms.emit(
            &Fanout::new()
                .roles(&visit.tenant_id, FRONT_DESK)
                .connection(conn.id),
            &ServerMessage::PatientRegistered(visit.clone()),
        );
        let tenant = visit.tenant_id.clone();
        self.queue_scope(&tenant, &ServerMessage::QueueUpdated { patient: visit });
        Ok(())
    }

    pub async fn move_patient(
        &self,
        conn: &ConnectionContext,
        payload: MovePatientPayload,
    ) -> Result<(), IntentError> {
        let session = authorize(conn.session.as_ref(), Requirement::Staff)?;

        let patch = VisitPatch {
            status: payload.status,
            doctor_id: payload.doctor_id,
            pharmacy_state: payload.pharmacy_state,
            ..Default::default()
        };
        let visit = self
            .storage
            .update_visit(&session.tenant_id, &payload.id, &patch)
            .await?
            .ok_or(IntentError::NotFound)?;

        tracing::info!(
            tenant = %visit.tenant_id,
            visit_id = %visit.id,
            status = %visit.status,
            "patient moved"
        );

        let tenant = visit.tenant_id.clone();
        self.queue_scope(&tenant, &ServerMessage::PatientUpdated(visit.clone()));
        self.rooms.emit(
            &Fanout::new().roles(&tenant, QUEUE_WATCHERS).tenant(&tenant),
            &ServerMessage::QueueUpdated {
                patient: visit.clone(),
            },
        );
        if payload.status == Some(VisitStatus::WithDoctor) {
            self.rooms.emit(
                &Fanout::new().tenant(&tenant),
                &ServerMessage::CurrentTokenUpdate {
                    token: visit.token,
                    doctor_id: visit.doctor_id,
                },
            );
        }
        Ok(())
    }

    pub async fn update_prescription(
        &self,
        conn: &ConnectionContext,
        payload: UpdatePrescriptionPayload,
    ) -> Result<(), IntentError> {
        let session = authorize(conn.session.as_ref(), Requirement::Staff)?;
        let tenant = session.tenant_id.clone();

        let follow_up_date = match payload.follow_up_date.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                Some(parse_date(raw).map_err(|e| IntentError::validation(e.to_string()))?)
            }
            _ => None,
        };

        let current = self
            .storage
            .find_visit(&tenant, &payload.id)
            .await?
            .ok_or(IntentError::NotFound)?;

        let share = follow_up_date.is_none() && is_shareable_prescription(&payload.prescription);
        let new_public_token = (share && current.public_token.is_none()).then(generate_public_token);

        let patch = VisitPatch {
            prescription: Some(payload.prescription.clone()),
            follow_up_date,
            public_token: new_public_token,
            ..Default::default()
        };
        let visit = self
            .storage
            .update_visit(&tenant, &payload.id, &patch)
            .await?
            .ok_or(IntentError::NotFound)?;

        tracing::info!(tenant = %tenant, visit_id = %visit.id, "prescription updated");

        if follow_up_date.is_some() {
            self.effects.follow_up_scheduled(&visit);
        } else if share && let Some(token) = visit.public_token.as_deref() {
            self.effects.prescription_ready(&visit, token);
        }

        if mentions_lab_work(&payload.prescription) {
            let draft = NewLabTest {
                tenant_id: tenant.clone(),
                patient_id: visit.id.clone(),
                test_name: lab::PRESCRIPTION_LAB_TEST_NAME.to_string(),
                ordered_by: self.roster.display_name(visit.doctor_id.as_deref()),
            };
            match self
                .storage
                .create_lab_test_unless_pending(draft, self.clock.today_start())
                .await
            {
                Ok(Some(test)) => {
                    tracing::info!(tenant = %tenant, test_id = %test.id, "lab test ordered from prescription");
                    self.rooms.emit(
                        &Fanout::new().roles(&tenant, &[RoleGroup::Lab]),
                        &ServerMessage::LabUpdate(test),
                    );
                }
                Ok(None) => {
                    tracing::debug!(visit_id = %visit.id, "pending lab test exists for today");
                }
                Err(e) => {
                    tracing::warn!(visit_id = %visit.id, error = %e, "automatic lab order failed");
                }
            }
        }

        self.rooms.emit(
            &Fanout::new().roles(&tenant, FRONT_DESK).connection(conn.id),
            &ServerMessage::PrescriptionUpdated(visit),
        );
        Ok(())
    }

    pub async fn create_lab_request(
        &self,
        conn: &ConnectionContext,
        payload: CreateLabRequestPayload,
    ) -> Result<(), IntentError> {
        let session = authorize(conn.session.as_ref(), Requirement::Staff)?;
        let tenant = session.tenant_id.clone();

        let visit = self
            .storage
            .find_visit(&tenant, &payload.patient_id)
            .await?
            .ok_or(IntentError::NotFound)?;

        let test_name = payload
            .test_name
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| lab::MANUAL_LAB_TEST_NAME.to_string());
        let ordered_by = self
            .roster
            .display_name(payload.doctor_id.as_deref().or(visit.doctor_id.as_deref()));

        let test = self
            .storage
            .create_lab_test(NewLabTest {
                tenant_id: tenant.clone(),
                patient_id: visit.id,
                test_name,
                ordered_by,
            })
            .await?;

        tracing::info!(tenant = %tenant, test_id = %test.id, "lab test requested");

        let test_id = test.id.clone();
        self.rooms.emit(
            &Fanout::new().roles(&tenant, &[RoleGroup::Lab]),
            &ServerMessage::LabUpdate(test),
        );
        self.rooms.send_to(
            conn.id,
            &ServerMessage::LabRequestCreated(LabRequestOutcome::created(test_id)),
        );
        Ok(())
    }

    pub async fn send_chat_message(&self, conn: &ConnectionContext, payload: ChatPayload) {
        let text = payload.text.trim();
        if text.is_empty() {
            tracing::debug!(connection_id = %conn.id, "empty chat message ignored");
            return;
        }
        let sender = payload
            .sender
            .or_else(|| conn.session.as_ref().map(|s| s.username.clone()));
        let role = payload
            .role
            .or_else(|| conn.session.as_ref().map(|s| s.role));
        self.chat
            .post(ChatMessage::new(sender, role, text.to_string(), now_utc()))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use medflow_core::{LabStatus, Role};
    use medflow_db_memory::InMemoryStorage;
    use medflow_notifications::{NotificationChannel, TemplateRenderer};
    use medflow_storage::{ClinicStorage, LabTestQuery};
    use serde_json::{Value, json};
    use tokio::sync::mpsc::Receiver;

    use super::*;
    use crate::realtime::rooms::{ConnectionHandle, Outbound};
    use crate::realtime::side_effects::testing::RecordingSender;
    use crate::session::{InMemorySessionStore, SessionStore, StaffUser};

    struct Harness {
        router: EventRouter,
        storage: Arc<InMemoryStorage>,
        sessions: Arc<InMemorySessionStore>,
        sender: Arc<RecordingSender>,
    }

    impl Harness {
        fn new(settings: RouterSettings) -> Self {
            Self::with_sender(settings, RecordingSender::default())
        }

        fn with_sender(settings: RouterSettings, sender: RecordingSender) -> Self {
            let storage = Arc::new(InMemoryStorage::new());
            let sessions = Arc::new(InMemorySessionStore::new(Duration::from_secs(600)));
            let sender = Arc::new(sender);
            let rooms = Arc::new(RoomRegistry::new());
            let roster = Arc::new(Roster::builtin());
            let effects = SideEffects::new(
                sender.clone(),
                TemplateRenderer::builtin("MedFlow"),
                roster.clone(),
                "https://portal.example.org",
            );
            let router = EventRouter::new(
                storage.clone(),
                rooms.clone(),
                ChatRoom::spawn(50, rooms),
                effects,
                sessions.clone(),
                roster,
                ClinicClock::utc(),
                settings,
            );
            Self {
                router,
                storage,
                sessions,
                sender,
            }
        }

        async fn staff(&self, tenant: &str, role: Role) -> Session {
            self.sessions
                .create(StaffUser {
                    user_id: format!("{role}-{tenant}"),
                    username: format!("{role}@{tenant}"),
                    role,
                    tenant_id: TenantId::new(tenant),
                })
                .await
        }

        fn connect(&self, session: Option<Session>) -> (ConnectionContext, Receiver<Outbound>) {
            let (handle, rx) = ConnectionHandle::channel(64);
            let ctx = ConnectionContext::new(handle.id(), session);
            self.router.rooms().register(handle);
            (ctx, rx)
        }

        /// Connects and joins the staff rooms of the session.
        async fn joined(&self, tenant: &str, role: Role) -> (ConnectionContext, Receiver<Outbound>) {
            let session = self.staff(tenant, role).await;
            let (mut ctx, rx) = self.connect(Some(session));
            self.send(&mut ctx, json!({"event": "join", "data": {}})).await;
            (ctx, rx)
        }

        async fn send(&self, ctx: &mut ConnectionContext, frame: Value) {
            self.router.handle_frame(ctx, &frame.to_string()).await;
        }

        async fn register(&self, ctx: &mut ConnectionContext, data: Value) {
            self.send(ctx, json!({"event": "register-patient", "data": data}))
                .await;
        }
    }

    fn drain(rx: &mut Receiver<Outbound>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(outbound) = rx.try_recv() {
            if let Outbound::Frame(frame) = outbound {
                out.push(serde_json::from_str(frame.as_str()).unwrap());
            }
        }
        out
    }

    fn names(events: &[Value]) -> Vec<&str> {
        events
            .iter()
            .map(|e| e["event"].as_str().unwrap_or_default())
            .collect()
    }

    fn find<'a>(events: &'a [Value], name: &str) -> &'a Value {
        &events
            .iter()
            .find(|e| e["event"] == name)
            .unwrap_or_else(|| panic!("no {name} event in {events:?}"))["data"]
    }

    #[tokio::test]
    async fn test_tokens_count_per_department() {
        let h = Harness::new(RouterSettings::default());
        let (mut desk, mut rx) = h.joined("h1", Role::Reception).await;

        h.register(&mut desk, json!({"name": "A"})).await;
        h.register(&mut desk, json!({"name": "B", "department": "General"})).await;
        h.register(&mut desk, json!({"name": "C", "department": "Cardiology"})).await;

        let events = drain(&mut rx);
        let tokens: Vec<(String, u64)> = events
            .iter()
            .filter(|e| e["event"] == "patient-registered")
            .map(|e| {
                (
                    e["data"]["department"].as_str().unwrap().to_string(),
                    e["data"]["token"].as_u64().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            tokens,
            vec![
                ("General".to_string(), 1),
                ("General".to_string(), 2),
                ("Cardiology".to_string(), 1)
            ]
        );
        // Auto-assigned from the roster.
        assert_eq!(events[0]["data"]["doctorId"], "1");
    }

    #[tokio::test]
    async fn test_registration_fans_out_within_tenant() {
        let h = Harness::new(RouterSettings::default());
        let (mut desk, mut desk_rx) = h.joined("h1", Role::Reception).await;
        let (_doctor, mut doctor_rx) = h.joined("h1", Role::Doctor).await;
        let (_lab, mut lab_rx) = h.joined("h1", Role::Lab).await;
        let (_other, mut other_rx) = h.joined("h2", Role::Reception).await;
        let (mut patient, mut patient_rx) = h.connect(None);
        h.send(&mut patient, json!({"event": "join-patient-room", "data": "h1"}))
            .await;

        h.register(&mut desk, json!({"name": " Ravi ", "phone": "+919800000000"}))
            .await;

        let desk_events = drain(&mut desk_rx);
        assert_eq!(names(&desk_events), vec!["patient-registered", "queue-updated"]);
        assert_eq!(find(&desk_events, "patient-registered")["name"], "Ravi");
        assert_eq!(
            names(&drain(&mut doctor_rx)),
            vec!["patient-registered", "queue-updated"]
        );
        assert_eq!(names(&drain(&mut lab_rx)), vec!["queue-updated"]);
        assert_eq!(names(&drain(&mut patient_rx)), vec!["queue-updated"]);
        assert!(drain(&mut other_rx).is_empty());

        let sent = h.sender.wait_for(1).await;
        assert_eq!(sent[0].0, "+919800000000");
        assert!(sent[0].1.contains("Token: #1"));
    }

    #[tokio::test]
    async fn test_global_queue_broadcasts_reach_everyone() {
        let h = Harness::new(RouterSettings {
            global_queue_broadcasts: true,
            ..Default::default()
        });
        let (mut desk, _desk_rx) = h.joined("h1", Role::Reception).await;
        let (_other, mut other_rx) = h.joined("h2", Role::Reception).await;

        h.register(&mut desk, json!({"name": "Ravi"})).await;
        assert_eq!(names(&drain(&mut other_rx)), vec!["queue-updated"]);
    }

    #[tokio::test]
    async fn test_register_without_session_is_rejected() {
        let h = Harness::new(RouterSettings::default());
        let (mut anon, mut rx) = h.connect(None);

        h.register(&mut anon, json!({"name": "Ravi"})).await;

        let events = drain(&mut rx);
        assert_eq!(names(&events), vec!["patient-registration-error"]);
        assert_eq!(events[0]["data"]["message"], "Not authenticated");
        assert_eq!(h.storage.visit_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_name_is_rejected() {
        let h = Harness::new(RouterSettings::default());
        let (mut desk, mut rx) = h.joined("h1", Role::Reception).await;

        h.register(&mut desk, json!({"name": "   "})).await;

        assert_eq!(names(&drain(&mut rx)), vec!["patient-registration-error"]);
        assert_eq!(h.storage.visit_count(), 0);
    }

    #[tokio::test]
    async fn test_move_is_partial_and_announces_current_token() {
        let h = Harness::new(RouterSettings::default());
        let (mut desk, mut desk_rx) = h.joined("h1", Role::Reception).await;
        let (mut patient, mut patient_rx) = h.connect(None);
        h.send(&mut patient, json!({"event": "join-patient-room", "data": "h1"}))
            .await;
        let (_idle, mut idle_rx) = h.connect(None);

        h.register(&mut desk, json!({"name": "Ravi", "doctorId": "2"})).await;
        let id = find(&drain(&mut desk_rx), "patient-registered")["id"]
            .as_str()
            .unwrap()
            .to_string();
        drain(&mut patient_rx);

        h.send(
            &mut desk,
            json!({"event": "move-patient", "data": {"id": id, "status": "with-doctor"}}),
        )
        .await;

        let visit = h
            .storage
            .find_visit(&TenantId::new("h1"), &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(visit.status, VisitStatus::WithDoctor);
        assert_eq!(visit.doctor_id.as_deref(), Some("2"));
        assert_eq!(visit.name, "Ravi");

        let events = drain(&mut patient_rx);
        assert_eq!(
            names(&events),
            vec!["patient-updated", "queue-updated", "current-token-update"]
        );
        let current = find(&events, "current-token-update");
        assert_eq!(current["token"], 1);
        assert_eq!(current["doctorId"], "2");

        // Never joined a hospital, so no queue traffic at all.
        assert!(drain(&mut idle_rx).is_empty());
    }

    #[tokio::test]
    async fn test_cross_tenant_move_is_rejected_to_caller_only() {
        let h = Harness::new(RouterSettings::default());
        let (mut desk, mut desk_rx) = h.joined("h1", Role::Reception).await;
        let (mut intruder, mut intruder_rx) = h.joined("h2", Role::Reception).await;

        h.register(&mut desk, json!({"name": "Ravi"})).await;
        let id = find(&drain(&mut desk_rx), "patient-registered")["id"]
            .as_str()
            .unwrap()
            .to_string();

        h.send(
            &mut intruder,
            json!({"event": "move-patient", "data": {"id": id, "status": "completed"}}),
        )
        .await;

        let events = drain(&mut intruder_rx);
        assert_eq!(names(&events), vec!["intent-rejected"]);
        assert_eq!(events[0]["data"]["intent"], "move-patient");
        assert_eq!(events[0]["data"]["message"], "Record not found for this tenant");
        assert!(drain(&mut desk_rx).is_empty());

        let visit = h
            .storage
            .find_visit(&TenantId::new("h1"), &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(visit.status, VisitStatus::Waiting);
    }

    #[tokio::test]
    async fn test_lab_keyword_orders_one_test_per_day() {
        let h = Harness::new(RouterSettings::default());
        let (mut doctor, mut doctor_rx) = h.joined("h1", Role::Doctor).await;
        let (_lab, mut lab_rx) = h.joined("h1", Role::Lab).await;

        h.register(&mut doctor, json!({"name": "Ravi", "phone": "+91"})).await;
        let id = find(&drain(&mut doctor_rx), "patient-registered")["id"]
            .as_str()
            .unwrap()
            .to_string();
        drain(&mut lab_rx);

        for _ in 0..2 {
            h.send(
                &mut doctor,
                json!({"event": "update-prescription", "data": {"id": id, "prescription": "Paracetamol, CBC"}}),
            )
            .await;
        }

        let lab_events = drain(&mut lab_rx);
        assert_eq!(names(&lab_events), vec!["lab-update"]);
        assert_eq!(lab_events[0]["data"]["testName"], lab::PRESCRIPTION_LAB_TEST_NAME);
        assert_eq!(lab_events[0]["data"]["orderedBy"], "Dr. Asha Patel");

        let tests = h
            .storage
            .list_lab_tests(&LabTestQuery::new(TenantId::new("h1")).for_patient(id.clone()))
            .await
            .unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].status, LabStatus::Pending);

        let doctor_events = drain(&mut doctor_rx);
        assert_eq!(
            names(&doctor_events),
            vec!["prescription-updated", "prescription-updated"]
        );
    }

    #[tokio::test]
    async fn test_prescription_link_is_shared_once() {
        let h = Harness::new(RouterSettings::default());
        let (mut doctor, mut rx) = h.joined("h1", Role::Doctor).await;
        h.register(&mut doctor, json!({"name": "Ravi", "phone": "+91"})).await;
        let id = find(&drain(&mut rx), "patient-registered")["id"]
            .as_str()
            .unwrap()
            .to_string();

        for text in ["Rest and fluids", "Rest, fluids and zinc"] {
            h.send(
                &mut doctor,
                json!({"event": "update-prescription", "data": {"id": id, "prescription": text}}),
            )
            .await;
        }

        // Registration SMS plus two WhatsApp links.
        let sent = h.sender.wait_for(3).await;
        let links: Vec<&String> = sent
            .iter()
            .filter(|(_, _, channel)| *channel == NotificationChannel::Whatsapp)
            .map(|(_, body, _)| body)
            .collect();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0], links[1]);

        let visit = h
            .storage
            .find_visit(&TenantId::new("h1"), &id)
            .await
            .unwrap()
            .unwrap();
        let token = visit.public_token.unwrap();
        assert!(links[0].ends_with(&format!("/api/public/prescription/{token}")));
        assert_eq!(h.storage.lab_test_count(), 0);
    }

    #[tokio::test]
    async fn test_follow_up_sends_reminder_instead_of_link() {
        let h = Harness::new(RouterSettings::default());
        let (mut doctor, mut rx) = h.joined("h1", Role::Doctor).await;
        h.register(&mut doctor, json!({"name": "Ravi", "phone": "+91"})).await;
        let id = find(&drain(&mut rx), "patient-registered")["id"]
            .as_str()
            .unwrap()
            .to_string();

        h.send(
            &mut doctor,
            json!({"event": "update-prescription", "data": {"id": id, "prescription": "Review in a week", "followUpDate": "2024-06-01"}}),
        )
        .await;

        let events = drain(&mut rx);
        assert_eq!(find(&events, "prescription-updated")["followUpDate"], "2024-06-01");
        let sent = h.sender.wait_for(2).await;
        let reminder = sent
            .iter()
            .find(|(_, body, _)| body.contains("follow-up visit on 2024-06-01"))
            .unwrap();
        assert_eq!(reminder.2, NotificationChannel::Sms);
        assert!(sent.iter().all(|(_, _, c)| *c == NotificationChannel::Sms));
    }

    #[tokio::test]
    async fn test_bad_follow_up_date_is_rejected() {
        let h = Harness::new(RouterSettings::default());
        let (mut doctor, mut rx) = h.joined("h1", Role::Doctor).await;
        h.register(&mut doctor, json!({"name": "Ravi"})).await;
        let id = find(&drain(&mut rx), "patient-registered")["id"]
            .as_str()
            .unwrap()
            .to_string();

        h.send(
            &mut doctor,
            json!({"event": "update-prescription", "data": {"id": id, "prescription": "x", "followUpDate": "next week"}}),
        )
        .await;

        let events = drain(&mut rx);
        assert_eq!(names(&events), vec!["intent-rejected"]);
        assert_eq!(events[0]["data"]["intent"], "update-prescription");
    }

    #[tokio::test]
    async fn test_manual_lab_request() {
        let h = Harness::new(RouterSettings::default());
        let (mut doctor, mut rx) = h.joined("h1", Role::Doctor).await;
        let (_lab, mut lab_rx) = h.joined("h1", Role::Lab).await;
        h.register(&mut doctor, json!({"name": "Ravi", "department": "Cardiology"}))
            .await;
        let id = find(&drain(&mut rx), "patient-registered")["id"]
            .as_str()
            .unwrap()
            .to_string();
        drain(&mut lab_rx);

        h.send(
            &mut doctor,
            json!({"event": "create-lab-request", "data": {"patientId": id, "testName": "Lipid profile"}}),
        )
        .await;

        let events = drain(&mut rx);
        let outcome = find(&events, "lab-request-created");
        assert_eq!(outcome["success"], true);
        let lab_events = drain(&mut lab_rx);
        let test = find(&lab_events, "lab-update");
        assert_eq!(test["id"], outcome["testId"]);
        assert_eq!(test["orderedBy"], "Dr. Vikram Shah");

        h.send(
            &mut doctor,
            json!({"event": "create-lab-request", "data": {"patientId": "missing"}}),
        )
        .await;
        let events = drain(&mut rx);
        assert_eq!(find(&events, "lab-request-created")["success"], false);
        assert!(drain(&mut lab_rx).is_empty());
    }

    #[tokio::test]
    async fn test_join_uses_session_not_declared_tenant() {
        let h = Harness::new(RouterSettings::default());
        let session = h.staff("h1", Role::Doctor).await;
        let (mut ctx, _rx) = h.connect(Some(session));

        h.send(
            &mut ctx,
            json!({"event": "join", "data": {"role": "lab", "hospitalId": "h2"}}),
        )
        .await;

        let groups = h.router.rooms().groups_of(ctx.id);
        let h1 = TenantId::new("h1");
        assert!(groups.contains(&Group::tenant(&h1)));
        assert!(groups.contains(&Group::role(&h1, RoleGroup::Doctors)));
        assert_eq!(groups.len(), 2);
    }

    #[tokio::test]
    async fn test_join_with_bare_role_string() {
        let h = Harness::new(RouterSettings::default());
        let (mut desk, mut desk_rx) = h.joined("h1", Role::Reception).await;
        let session = h.staff("h1", Role::Lab).await;
        let (mut lab, mut lab_rx) = h.connect(Some(session));

        h.send(&mut lab, json!({"event": "join", "data": "lab"})).await;

        let h1 = TenantId::new("h1");
        let groups = h.router.rooms().groups_of(lab.id);
        assert!(groups.contains(&Group::role(&h1, RoleGroup::Lab)));

        h.register(&mut desk, json!({"name": "Ravi"})).await;
        let id = find(&drain(&mut desk_rx), "patient-registered")["id"]
            .as_str()
            .unwrap()
            .to_string();
        h.send(
            &mut desk,
            json!({"event": "create-lab-request", "data": {"patientId": id, "testName": "Lipid panel"}}),
        )
        .await;
        let events = drain(&mut lab_rx);
        assert_eq!(find(&events, "lab-update")["testName"], "Lipid panel");
    }

    #[tokio::test]
    async fn test_join_without_data_still_joins() {
        let h = Harness::new(RouterSettings::default());
        let session = h.staff("h1", Role::Pharmacy).await;
        let (mut ctx, _rx) = h.connect(Some(session));

        h.send(&mut ctx, json!({"event": "join"})).await;

        assert_eq!(h.router.rooms().groups_of(ctx.id).len(), 2);
    }

    #[tokio::test]
    async fn test_register_accepts_form_strings() {
        let h = Harness::new(RouterSettings::default());
        let (mut desk, mut rx) = h.joined("h1", Role::Reception).await;

        h.register(
            &mut desk,
            json!({"name": "Asha", "age": "34", "gender": "F", "cost": "", "department": "General"}),
        )
        .await;

        let events = drain(&mut rx);
        let registered = find(&events, "patient-registered");
        assert_eq!(registered["age"], 34);
        assert_eq!(h.storage.visit_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_intents_are_answered() {
        let h = Harness::new(RouterSettings::default());
        let (mut desk, mut rx) = h.joined("h1", Role::Reception).await;

        h.register(&mut desk, json!({"name": "Asha", "age": "thirty"})).await;
        h.send(&mut desk, json!({"event": "move-patient", "data": {"status": "completed"}}))
            .await;
        h.send(&mut desk, json!({"event": "create-lab-request", "data": "cbc"}))
            .await;
        h.send(&mut desk, json!({"event": "no-such-event", "data": {}}))
            .await;

        let events = drain(&mut rx);
        assert_eq!(
            names(&events),
            vec![
                "patient-registration-error",
                "intent-rejected",
                "lab-request-created"
            ]
        );
        assert_eq!(events[1]["data"]["intent"], "move-patient");
        assert_eq!(events[2]["data"]["success"], false);
        assert_eq!(h.storage.visit_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_notifications_do_not_undo_changes() {
        let h = Harness::with_sender(RouterSettings::default(), RecordingSender::failing());
        let (mut doctor, mut rx) = h.joined("h1", Role::Doctor).await;

        h.register(&mut doctor, json!({"name": "Ravi", "phone": "+91"})).await;
        let events = drain(&mut rx);
        let id = find(&events, "patient-registered")["id"]
            .as_str()
            .unwrap()
            .to_string();

        h.send(
            &mut doctor,
            json!({"event": "update-prescription", "data": {"id": id, "prescription": "Rest and fluids"}}),
        )
        .await;

        let events = drain(&mut rx);
        assert_eq!(
            find(&events, "prescription-updated")["prescription"],
            "Rest and fluids"
        );
        // Both sends were attempted and failed.
        assert_eq!(h.sender.wait_for(2).await.len(), 2);

        let visit = h
            .storage
            .find_visit(&TenantId::new("h1"), &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(visit.prescription.as_deref(), Some("Rest and fluids"));
        assert!(visit.public_token.is_some());
    }

    #[tokio::test]
    async fn test_join_without_session_joins_nothing() {
        let h = Harness::new(RouterSettings::default());
        let (mut ctx, _rx) = h.connect(None);
        h.send(&mut ctx, json!({"event": "join", "data": {"hospitalId": "h1"}}))
            .await;
        assert!(h.router.rooms().groups_of(ctx.id).is_empty());
    }

    #[tokio::test]
    async fn test_patient_room_by_visit_token() {
        let h = Harness::new(RouterSettings {
            allow_anonymous_patient_rooms: false,
            ..Default::default()
        });
        let (mut doctor, mut rx) = h.joined("h1", Role::Doctor).await;
        h.register(&mut doctor, json!({"name": "Ravi"})).await;
        let id = find(&drain(&mut rx), "patient-registered")["id"]
            .as_str()
            .unwrap()
            .to_string();
        h.send(
            &mut doctor,
            json!({"event": "update-prescription", "data": {"id": id, "prescription": "Rest and fluids"}}),
        )
        .await;
        let token = find(&drain(&mut rx), "prescription-updated")["publicToken"]
            .as_str()
            .unwrap()
            .to_string();

        let (mut bare, mut bare_rx) = h.connect(None);
        h.send(&mut bare, json!({"event": "join-patient-room", "data": "h1"}))
            .await;
        assert_eq!(names(&drain(&mut bare_rx)), vec!["intent-rejected"]);
        assert!(h.router.rooms().groups_of(bare.id).is_empty());

        let (mut scoped, _scoped_rx) = h.connect(None);
        h.send(
            &mut scoped,
            json!({"event": "join-patient-room", "data": {"visitToken": token}}),
        )
        .await;
        assert!(
            h.router
                .rooms()
                .groups_of(scoped.id)
                .contains(&Group::tenant(&TenantId::new("h1")))
        );
    }

    #[tokio::test]
    async fn test_revoked_session_is_dropped_when_revalidating() {
        let h = Harness::new(RouterSettings {
            revalidate_sessions: true,
            ..Default::default()
        });
        let session = h.staff("h1", Role::Reception).await;
        let token = session.token.clone();
        let (mut ctx, mut rx) = h.connect(Some(session));

        h.register(&mut ctx, json!({"name": "A"})).await;
        assert_eq!(names(&drain(&mut rx)), vec!["patient-registered"]);

        h.sessions.revoke(&token).await;
        h.register(&mut ctx, json!({"name": "B"})).await;
        assert_eq!(names(&drain(&mut rx)), vec!["patient-registration-error"]);
        assert!(ctx.session.is_none());
        assert_eq!(h.storage.visit_count(), 1);
    }

    #[tokio::test]
    async fn test_chat_falls_back_to_session_identity() {
        let h = Harness::new(RouterSettings::default());
        let (mut ctx, mut rx) = h.joined("h1", Role::Pharmacy).await;
        let (mut anon, mut anon_rx) = h.connect(None);

        h.send(
            &mut ctx,
            json!({"event": "send-chat-message", "data": {"text": "  stock low  "}}),
        )
        .await;
        h.send(&mut anon, json!({"event": "send-chat-message", "data": {"text": " "}}))
            .await;

        let history = h.router.chat().history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "stock low");
        assert_eq!(history[0].role, Some(Role::Pharmacy));

        assert_eq!(names(&drain(&mut rx)), vec!["chat-message"]);
        assert_eq!(names(&drain(&mut anon_rx)), vec!["chat-message"]);
    }
}
