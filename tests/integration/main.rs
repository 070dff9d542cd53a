//! Integration tests for sessiond

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn sessiond() -> Command {
        cargo_bin_cmd!("sessiond")
    }

    /// Command pointed at a config file that does not exist, so defaults apply
    fn isolated(temp: &TempDir) -> Command {
        let mut cmd = sessiond();
        cmd.env_remove("SESSIOND_SERVER")
            .env_remove("SESSIOND_SESSION_ROOT")
            .arg("--config")
            .arg(temp.path().join("config.toml"));
        cmd
    }

    #[test]
    fn help_displays() {
        sessiond()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("multi-tenant messaging session supervisor"));
    }

    #[test]
    fn version_displays() {
        sessiond()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("sessiond"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        isolated(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        isolated(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("[sessions]"));
    }

    #[test]
    fn config_init_writes_file() {
        let temp = TempDir::new().unwrap();
        isolated(&temp)
            .args(["config", "init"])
            .assert()
            .success();

        let written = std::fs::read_to_string(temp.path().join("config.toml")).unwrap();
        assert!(written.contains("[server]"));
    }

    #[test]
    fn sessions_list_empty() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("sessions");
        isolated(&temp)
            .args(["sessions", "list", "--session-root"])
            .arg(&root)
            .assert()
            .success()
            .stdout(predicate::str::contains("No stored sessions"));
    }

    #[test]
    fn sessions_list_json_shows_stored_tenant() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("sessions");
        std::fs::create_dir_all(root.join("acme")).unwrap();
        std::fs::write(root.join("acme").join("creds.json"), "{}").unwrap();

        isolated(&temp)
            .args(["sessions", "list", "--format", "json", "--session-root"])
            .arg(&root)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"tenant\": \"acme\""));
    }

    #[test]
    fn sessions_wipe_removes_credentials() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("sessions");
        std::fs::create_dir_all(root.join("acme")).unwrap();
        std::fs::write(root.join("acme").join("creds.json"), "{}").unwrap();

        isolated(&temp)
            .args(["sessions", "wipe", "acme", "--yes", "--session-root"])
            .arg(&root)
            .assert()
            .success();

        assert!(!root.join("acme").exists());
    }

    #[test]
    fn sessions_wipe_rejects_invalid_tenant() {
        let temp = TempDir::new().unwrap();
        isolated(&temp)
            .args(["sessions", "wipe", "../etc", "--yes"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid tenant id"));
    }

    #[test]
    fn status_unreachable_server() {
        let temp = TempDir::new().unwrap();
        isolated(&temp)
            .args(["status", "acme", "--server", "http://127.0.0.1:9"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Hint:"));
    }
}

mod http_tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use sessiond::http::{build_router, AppState};
    use sessiond::journal::{AuditLog, Inbox, Journal};
    use sessiond::session::{SessionRegistry, SupervisorSettings};
    use sessiond::tenant::TenantId;
    use sessiond::transport::{ClientEvent, LoopbackTransport};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        transport: Arc<LoopbackTransport>,
        temp: TempDir,
    }

    fn harness() -> Harness {
        harness_with(SupervisorSettings::default())
    }

    fn harness_with(settings: SupervisorSettings) -> Harness {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(LoopbackTransport::new(None));
        let inbox = Arc::new(Inbox::at(temp.path().join("inbox"), true));
        let (journal, _writer) = Journal::spawn(
            AuditLog::at(temp.path().join("audit.log"), true),
            Some(Arc::clone(&inbox)),
        );

        let registry = SessionRegistry::new(
            temp.path().join("sessions"),
            settings,
            transport.clone(),
        )
        .with_journal(journal);
        let state = AppState::new(Arc::new(registry)).with_inbox(inbox);

        Harness {
            app: build_router(state, &[]),
            transport,
            temp,
        }
    }

    fn tenant(id: &str) -> TenantId {
        TenantId::parse(id).unwrap()
    }

    async fn request(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<&str>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    /// Poll the status route until the predicate holds
    async fn wait_for_status(app: &Router, id: &str, check: impl Fn(&Value) -> bool) -> Value {
        let uri = format!("/sessions/{}/status", id);
        for _ in 0..200 {
            let (_, body) = request(app, "GET", &uri, None).await;
            if check(&body) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("status of {} never matched", id);
    }

    async fn paired(h: &Harness, id: &str) {
        let (status, _) = request(&h.app, "POST", &format!("/sessions/{}/start", id), None).await;
        assert_eq!(status, StatusCode::OK);
        wait_for_status(&h.app, id, |s| s["state"] == "AwaitingQRScan").await;
        assert!(h.transport.pair(&tenant(id)).await);
        wait_for_status(&h.app, id, |s| s["state"] == "Connected").await;
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let h = harness();
        let (status, body) = request(&h.app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["tenants"], 0);
    }

    #[tokio::test]
    async fn unknown_tenant_is_idle() {
        let h = harness();
        let (status, body) = request(&h.app, "GET", "/sessions/acme/status", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tenantId"], "acme");
        assert_eq!(body["state"], "Idle");

        let (_, body) = request(&h.app, "GET", "/sessions/acme/qr", None).await;
        assert_eq!(body["qr"], Value::Null);
        assert_eq!(h.transport.connect_count(&tenant("acme")), 0);
    }

    #[tokio::test]
    async fn qr_pairing_flow() {
        let h = harness();
        request(&h.app, "POST", "/sessions/acme/start", None).await;
        wait_for_status(&h.app, "acme", |s| s["state"] == "AwaitingQRScan").await;

        h.transport
            .emit(&tenant("acme"), ClientEvent::QrIssued("ABC123".into()))
            .await;
        let body = wait_for_status(&h.app, "acme", |s| s["lastQrPayload"] == "ABC123").await;
        assert_eq!(body["state"], "AwaitingQRScan");

        let (_, body) = request(&h.app, "GET", "/sessions/acme/qr", None).await;
        assert_eq!(body["qr"], "ABC123");

        h.transport
            .emit(
                &tenant("acme"),
                ClientEvent::Opened {
                    identity: Some("5215512345678@s.whatsapp.net".into()),
                },
            )
            .await;
        let body = wait_for_status(&h.app, "acme", |s| s["state"] == "Connected").await;
        assert_eq!(body["lastQrPayload"], Value::Null);
        assert_eq!(body["connectedIdentity"], "5215512345678@s.whatsapp.net");
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let h = harness();
        paired(&h, "acme").await;

        let (status, body) = request(&h.app, "POST", "/sessions/acme/start", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "Connected");
        assert_eq!(h.transport.connect_count(&tenant("acme")), 1);
    }

    #[tokio::test]
    async fn logout_wipes_credentials() {
        let h = harness();
        paired(&h, "acme").await;
        let dir = h.temp.path().join("sessions").join("acme");
        assert!(dir.exists());

        let (status, body) = request(&h.app, "POST", "/sessions/acme/logout", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert!(!dir.exists());

        let (_, body) = request(&h.app, "GET", "/sessions/acme/status", None).await;
        assert_eq!(body["state"], "LoggedOut");

        // The next start pairs from scratch
        request(&h.app, "POST", "/sessions/acme/start", None).await;
        let body = wait_for_status(&h.app, "acme", |s| s["state"] == "AwaitingQRScan").await;
        assert!(body["lastQrPayload"].is_string());
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let h = harness();
        paired(&h, "acme").await;

        let (_, body) = request(&h.app, "GET", "/sessions/globex/status", None).await;
        assert_eq!(body["state"], "Idle");

        request(&h.app, "POST", "/sessions/globex/start", None).await;
        wait_for_status(&h.app, "globex", |s| s["state"] == "AwaitingQRScan").await;

        request(&h.app, "POST", "/sessions/acme/logout", None).await;
        let (_, body) = request(&h.app, "GET", "/sessions/globex/status", None).await;
        assert_eq!(body["state"], "AwaitingQRScan");

        let (_, body) = request(&h.app, "GET", "/sessions", None).await;
        let sessions = body["sessions"].as_array().unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0]["tenantId"], "acme");
        assert_eq!(sessions[1]["tenantId"], "globex");
    }

    #[tokio::test]
    async fn send_delivers_when_connected() {
        let h = harness();
        paired(&h, "acme").await;

        let (status, body) = request(
            &h.app,
            "POST",
            "/sessions/acme/send",
            Some(r#"{"to": "+52 1 55 1234 5678", "text": "hola"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["result"]["to"], "5215512345678@s.whatsapp.net");
        assert!(body["result"]["messageId"].is_string());

        let sent = h.transport.sent(&tenant("acme"));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "hola");
    }

    #[tokio::test]
    async fn send_while_awaiting_qr_scan_fails() {
        let h = harness_with(SupervisorSettings {
            send_timeout: Duration::from_millis(200),
            ..Default::default()
        });
        request(&h.app, "POST", "/sessions/acme/start", None).await;
        wait_for_status(&h.app, "acme", |s| s["state"] == "AwaitingQRScan").await;

        let (status, body) = request(
            &h.app,
            "POST",
            "/sessions/acme/send",
            Some(r#"{"to": "5215512345678", "text": "hola"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], 500);
        assert!(body["error"].as_str().unwrap().contains("not connected"));
        assert!(h.transport.sent(&tenant("acme")).is_empty());

        let (_, body) = request(&h.app, "GET", "/sessions/acme/status", None).await;
        assert_eq!(body["state"], "AwaitingQRScan");
    }

    #[tokio::test]
    async fn send_rejects_bad_input_without_connecting() {
        let h = harness();
        let cases = [
            r#"{"to": "", "text": "hola"}"#,
            r#"{"to": "5215512345678", "text": ""}"#,
            r#"{"text": "hola"}"#,
            r#"{"to": "5215512345678"}"#,
            "not json",
        ];

        for body in cases {
            let (status, json) = request(&h.app, "POST", "/sessions/acme/send", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
            assert_eq!(json["status"], 400);
            assert!(json["error"].is_string());
        }

        assert_eq!(h.transport.connect_count(&tenant("acme")), 0);
    }

    #[tokio::test]
    async fn invalid_tenant_is_rejected() {
        let h = harness();
        for (method, uri) in [
            ("GET", "/sessions/bad.tenant/status"),
            ("POST", "/sessions/bad.tenant/start"),
            ("POST", "/sessions/bad.tenant/logout"),
        ] {
            let (status, body) = request(&h.app, method, uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{} {}", method, uri);
            assert!(body["error"].as_str().unwrap().contains("Invalid tenant id"));
        }
    }

    #[tokio::test]
    async fn inbound_messages_are_recorded() {
        let h = harness();
        paired(&h, "acme").await;

        assert!(
            h.transport
                .deliver_text(&tenant("acme"), "5215512345678@s.whatsapp.net", "hola")
                .await
        );

        let mut messages = Value::Null;
        for _ in 0..200 {
            let (_, body) = request(&h.app, "GET", "/sessions/acme/messages?limit=10", None).await;
            if body["messages"].as_array().is_some_and(|m| !m.is_empty()) {
                messages = body["messages"].clone();
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let messages = messages.as_array().expect("message was never recorded");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"], "hola");
        assert_eq!(messages[0]["from"], "lead");
    }
}
