pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod realtime;
pub mod server;
pub mod session;

pub use config::AppConfig;
pub use error::ApiError;
pub use observability::{init_tracing, shutdown_tracing};
pub use server::{AppState, MedflowServer, ServerBuilder, build_app};
pub use session::{InMemorySessionStore, Session, SessionStore, hash_password};
