use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    middleware,
    routing::{get, post},
};
use medflow_core::{ClinicClock, Roster, time::parse_utc_offset};
use medflow_notifications::{NotificationSender, Notifier, TemplateRenderer};
use medflow_storage::DynStorage;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::AppConfig,
    handlers, middleware as app_middleware,
    realtime::{ChatRoom, EventRouter, RoomRegistry, RouterSettings, SideEffects},
    session::{DynSessionStore, InMemorySessionStore, StaffDirectory},
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: DynStorage,
    pub sessions: DynSessionStore,
    pub staff: Arc<StaffDirectory>,
    pub roster: Arc<Roster>,
    pub router: Arc<EventRouter>,
    pub effects: SideEffects,
}

impl FromRef<AppState> for DynSessionStore {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl AppState {
    /// Wires storage, sessions, notifications and the realtime router.
    /// Must be called from within a tokio runtime.
    pub fn from_config(cfg: &AppConfig) -> Result<Self, String> {
        let offset = parse_utc_offset(&cfg.clinic.utc_offset).map_err(|e| e.to_string())?;
        let storage: DynStorage = medflow_db_memory::create_clinic_storage();
        let sessions: DynSessionStore = Arc::new(InMemorySessionStore::new(cfg.session_ttl()));
        let staff = Arc::new(StaffDirectory::new(&cfg.bootstrap.users));
        let roster = Arc::new(cfg.roster.clone());

        let notifier: Arc<dyn NotificationSender> =
            Arc::new(Notifier::new(cfg.notifications.clone()));
        let effects = SideEffects::new(
            notifier,
            TemplateRenderer::builtin(&cfg.clinic.name),
            roster.clone(),
            cfg.portal_base_url(),
        );

        let rooms = Arc::new(RoomRegistry::new());
        let chat = ChatRoom::spawn(cfg.realtime.chat_history_limit, rooms.clone());
        let settings = RouterSettings {
            allow_anonymous_patient_rooms: cfg.realtime.allow_anonymous_patient_rooms,
            global_queue_broadcasts: cfg.realtime.global_queue_broadcasts,
            revalidate_sessions: cfg.realtime.revalidate_sessions,
        };
        let router = Arc::new(EventRouter::new(
            storage.clone(),
            rooms,
            chat,
            effects.clone(),
            sessions.clone(),
            roster.clone(),
            ClinicClock::new(offset),
            settings,
        ));

        tracing::info!(
            storage = storage.backend_name(),
            staff_accounts = staff.len(),
            doctors = roster.doctors().len(),
            notifications = ?cfg.notifications.provider,
            "application state initialized"
        );

        Ok(Self {
            config: Arc::new(cfg.clone()),
            storage,
            sessions,
            staff,
            roster,
            router,
            effects,
        })
    }
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        // Staff authentication
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/auth/me", get(handlers::me))
        // Realtime
        .route("/ws", get(handlers::ws_upgrade))
        // Staff views
        .route("/api/queue", get(handlers::queue_snapshot))
        .route("/api/lab/tests", get(handlers::list_lab_tests))
        .route("/api/lab/tests/{id}/status", post(handlers::update_lab_status))
        .route("/api/lab/tests/{id}/results", post(handlers::upload_lab_results))
        // Patient facing
        .route(
            "/api/public/prescription/{token}",
            get(handlers::public_prescription),
        )
        .route(
            "/api/patient-app/appointments",
            post(handlers::create_appointment),
        )
        .route(
            "/api/patient-app/pharmacy/orders",
            post(handlers::create_pharmacy_order),
        )
        .with_state(state)
        // Middleware stack (order: request id -> compression/cors/trace -> body limit)
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct MedflowServer {
    addr: SocketAddr,
    app: Router,
    rooms: Arc<RoomRegistry>,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self) -> Result<MedflowServer, String> {
        self.config.validate()?;
        let state = AppState::from_config(&self.config)?;
        let rooms = state.router.rooms().clone();
        Ok(MedflowServer {
            addr: self.addr,
            app: build_app(state),
            rooms,
        })
    }
}

impl MedflowServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let rooms = self.rooms.clone();
        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                // Open sockets would otherwise hold the graceful shutdown.
                rooms.close_all();
            })
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
