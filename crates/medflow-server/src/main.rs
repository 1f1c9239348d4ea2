use std::env;

use medflow_server::config::loader::{DEFAULT_CONFIG_FILE, load_config};
use medflow_server::{ServerBuilder, hash_password, shutdown_tracing};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From MEDFLOW_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (medflow.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (MEDFLOW_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // `medflow-server hash-password <password>` prints a PHC string for
    // `[[bootstrap.users]]` and exits.
    let args: Vec<String> = env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("hash-password") {
        let Some(password) = args.get(1) else {
            eprintln!("usage: medflow-server hash-password <password>");
            std::process::exit(2);
        };
        match hash_password(password) {
            Ok(hash) => println!("{hash}"),
            Err(e) => {
                eprintln!("Failed to hash password: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    // .env is optional
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    medflow_server::observability::init_tracing();

    let (config_path, source) = resolve_config_path(&args);

    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );

    medflow_server::observability::apply_logging_level(&cfg.logging.level);

    if cfg.bootstrap.users.is_empty() {
        tracing::warn!("no staff accounts configured; staff login is disabled");
    }

    let server = match ServerBuilder::new().with_config(cfg).build() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Server initialization failed: {e}");
            std::process::exit(2);
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("Server error: {err}");
    }

    shutdown_tracing();
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: MEDFLOW_CONFIG
/// 3. Default: medflow.toml
fn resolve_config_path(args: &[String]) -> (String, ConfigSource) {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config"
            && let Some(path) = iter.next()
        {
            return (path.clone(), ConfigSource::CliArgument);
        }
    }

    if let Ok(path) = env::var("MEDFLOW_CONFIG")
        && !path.is_empty()
    {
        return (path, ConfigSource::EnvironmentVariable);
    }

    (DEFAULT_CONFIG_FILE.to_string(), ConfigSource::Default)
}
