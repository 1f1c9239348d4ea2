use medflow_core::{Role, Roster, TenantId};
use medflow_notifications::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// WebSocket fan-out and room behaviour
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Hospital identity and clinic-day offset
    #[serde(default)]
    pub clinic: ClinicConfig,
    /// Patient portal links
    #[serde(default)]
    pub portal: PortalConfig,
    /// Outbound SMS / WhatsApp provider
    #[serde(default)]
    pub notifications: ProviderConfig,
    /// Doctors available for auto-assignment
    #[serde(default = "Roster::builtin")]
    pub roster: Roster,
    /// Staff accounts loaded at startup
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            realtime: RealtimeConfig::default(),
            session: SessionConfig::default(),
            clinic: ClinicConfig::default(),
            portal: PortalConfig::default(),
            notifications: ProviderConfig::default(),
            roster: Roster::builtin(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Realtime validations
        if self.realtime.chat_history_limit == 0 {
            return Err("realtime.chat_history_limit must be > 0".into());
        }
        if self.realtime.outbound_queue_capacity == 0 {
            return Err("realtime.outbound_queue_capacity must be > 0".into());
        }
        if self.realtime.heartbeat_secs == 0 {
            return Err("realtime.heartbeat_secs must be > 0".into());
        }
        if self.session.ttl_secs == 0 {
            return Err("session.ttl_secs must be > 0".into());
        }
        // Clinic validation
        medflow_core::time::parse_utc_offset(&self.clinic.utc_offset)
            .map_err(|e| format!("clinic.utc_offset: {e}"))?;
        if self.clinic.name.trim().is_empty() {
            return Err("clinic.name must not be empty".into());
        }
        if let Some(base) = &self.portal.base_url {
            url::Url::parse(base).map_err(|e| format!("portal.base_url is not a valid URL: {e}"))?;
        }
        // Roster validation
        let mut ids = HashSet::new();
        for doctor in self.roster.doctors() {
            if !ids.insert(doctor.id.as_str()) {
                return Err(format!("roster contains duplicate doctor id '{}'", doctor.id));
            }
        }
        // Bootstrap accounts
        let mut accounts = HashSet::new();
        for user in &self.bootstrap.users {
            if user.username.trim().is_empty() {
                return Err("bootstrap.users entries require a username".into());
            }
            if TenantId::parse(&user.hospital_id).is_err() {
                return Err(format!(
                    "bootstrap user '{}' has an empty hospital_id",
                    user.username
                ));
            }
            if argon2::PasswordHash::new(&user.password_hash).is_err() {
                return Err(format!(
                    "bootstrap user '{}' password_hash is not a PHC string",
                    user.username
                ));
            }
            if !accounts.insert((user.hospital_id.as_str(), user.username.as_str())) {
                return Err(format!(
                    "bootstrap user '{}' is defined twice for hospital '{}'",
                    user.username, user.hospital_id
                ));
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    /// Returns the base URL used in patient-facing links.
    /// If `portal.base_url` is configured, returns that; otherwise computes from host:port.
    pub fn portal_base_url(&self) -> String {
        self.portal
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.server.host, self.server.port))
            .trim_end_matches('/')
            .to_string()
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session.ttl_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.realtime.heartbeat_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    5000
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Number of staff chat messages kept for replay
    #[serde(default = "default_chat_history_limit")]
    pub chat_history_limit: usize,
    /// Per-connection outbound frame buffer; frames beyond it are dropped
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Accept `join-patient-room` with a bare hospital id
    #[serde(default = "default_true")]
    pub allow_anonymous_patient_rooms: bool,
    /// Send registration `queue-updated` and `patient-updated` to every
    /// connection instead of the visit's hospital only
    #[serde(default)]
    pub global_queue_broadcasts: bool,
    /// Re-resolve the connection's session before each mutating intent
    #[serde(default)]
    pub revalidate_sessions: bool,
}

fn default_chat_history_limit() -> usize {
    50
}
fn default_outbound_queue_capacity() -> usize {
    256
}
fn default_heartbeat_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            chat_history_limit: default_chat_history_limit(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            heartbeat_secs: default_heartbeat_secs(),
            allow_anonymous_patient_rooms: true,
            global_queue_broadcasts: false,
            revalidate_sessions: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
    /// Mark the session cookie `Secure`
    #[serde(default)]
    pub secure_cookie: bool,
}

fn default_session_ttl() -> u64 {
    24 * 60 * 60
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
            secure_cookie: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicConfig {
    /// Name used in patient messages
    #[serde(default = "default_clinic_name")]
    pub name: String,
    /// Local offset for the clinic day, e.g. "+05:30"
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
}

fn default_clinic_name() -> String {
    "MedFlow".into()
}
fn default_utc_offset() -> String {
    "+00:00".into()
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            name: default_clinic_name(),
            utc_offset: default_utc_offset(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub users: Vec<StaffAccount>,
}

/// A staff login. `password_hash` is an argon2 PHC string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffAccount {
    pub hospital_id: String,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    /// Defaults to the username
    #[serde(default)]
    pub user_id: Option<String>,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_FILE: &str = "medflow.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., MEDFLOW__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("MEDFLOW")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.realtime.chat_history_limit, 50);
        assert!(cfg.realtime.allow_anonymous_patient_rooms);
        assert!(!cfg.realtime.global_queue_broadcasts);
        assert_eq!(cfg.roster.doctors().len(), 4);
        assert_eq!(cfg.session_ttl(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_portal_base_url_fallback() {
        let mut cfg = AppConfig::default();
        cfg.server.host = "127.0.0.1".into();
        cfg.server.port = 8081;
        assert_eq!(cfg.portal_base_url(), "http://127.0.0.1:8081");
        cfg.portal.base_url = Some("https://portal.example.org/".into());
        assert_eq!(cfg.portal_base_url(), "https://portal.example.org");
    }

    #[test]
    fn test_rejects_bad_offset() {
        let mut cfg = AppConfig::default();
        cfg.clinic.utc_offset = "IST".into();
        assert!(cfg.validate().unwrap_err().contains("clinic.utc_offset"));
    }

    #[test]
    fn test_rejects_bad_password_hash() {
        let mut cfg = AppConfig::default();
        cfg.bootstrap.users.push(StaffAccount {
            hospital_id: "h1".into(),
            username: "asha".into(),
            password_hash: "plaintext".into(),
            role: Role::Reception,
            user_id: None,
        });
        assert!(cfg.validate().unwrap_err().contains("PHC"));
    }

    #[test]
    fn test_rejects_zero_queue_capacity() {
        let mut cfg = AppConfig::default();
        cfg.realtime.outbound_queue_capacity = 0;
        assert!(cfg.validate().is_err());
    }
}
