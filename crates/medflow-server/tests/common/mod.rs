#![allow(dead_code)]

use medflow_core::Role;
use medflow_server::config::StaffAccount;
use medflow_server::{AppConfig, AppState, build_app, hash_password};
use tokio::task::JoinHandle;

pub const PASSWORD: &str = "s3cret";

pub struct TestServer {
    pub base: String,
    pub state: AppState,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.state.router.rooms().close_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

fn staff(hospital: &str, username: &str, role: Role) -> StaffAccount {
    StaffAccount {
        hospital_id: hospital.into(),
        username: username.into(),
        password_hash: hash_password(PASSWORD).expect("hash"),
        role,
        user_id: None,
    }
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.portal.base_url = Some("https://portal.example.org".into());
    cfg.bootstrap.users = vec![
        staff("h1", "desk", Role::Reception),
        staff("h1", "asha", Role::Doctor),
        staff("h1", "lab", Role::Lab),
        staff("h2", "desk", Role::Reception),
    ];
    cfg
}

pub async fn start_server(cfg: AppConfig) -> TestServer {
    let state = AppState::from_config(&cfg).expect("state");
    let app = build_app(state.clone());

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    TestServer {
        base: format!("http://{addr}"),
        state,
        shutdown: Some(tx),
        handle: Some(handle),
    }
}

pub async fn login(client: &reqwest::Client, base: &str, hospital: &str, username: &str) -> String {
    let resp = client
        .post(format!("{base}/api/auth/login"))
        .json(&serde_json::json!({
            "hospitalId": hospital,
            "username": username,
            "password": PASSWORD,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}
