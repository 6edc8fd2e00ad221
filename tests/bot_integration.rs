//! Integration tests for the webhook + REST surface.
//!
//! Each test spins up an Axum server on a random port backed by an
//! in-memory database and a recording channel, then drives it over HTTP.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeDelta;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use intake_bot::channels::Channel;
use intake_bot::clock::ManualClock;
use intake_bot::config::BotConfig;
use intake_bot::dispatch::Dispatcher;
use intake_bot::error::ChannelError;
use intake_bot::server::bot_routes;
use intake_bot::session::{PauseStore, SessionStore};
use intake_bot::store::LibSqlBackend;

/// Channel that records outgoing texts instead of sending them.
#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingChannel {
    fn texts_for(&self, user_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == user_id)
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_text(&self, user_id: &str, text: &str) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap()
            .push((user_id.to_string(), text.to_string()));
        Ok(())
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    channel: Arc<RecordingChannel>,
    clock: Arc<ManualClock>,
}

impl TestServer {
    async fn start() -> Self {
        let config = BotConfig {
            dedup_grace: Duration::ZERO,
            ..BotConfig::default()
        };
        let clock = Arc::new(ManualClock::default());
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let channel = Arc::new(RecordingChannel::default());

        let pauses = Arc::new(PauseStore::new(db.clone(), clock.clone()));
        let sessions = Arc::new(SessionStore::new(clock.clone(), config.history_limit));
        let dispatcher = Arc::new(Dispatcher::new(
            config,
            pauses,
            sessions,
            channel.clone(),
            db.clone(),
            clock.clone(),
        ));
        let app = bot_routes(dispatcher, db);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting connections.
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            base: format!("http://127.0.0.1:{port}"),
            client: reqwest::Client::new(),
            channel,
            clock,
        }
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn customer_says(&self, phone: &str, text: &str) -> Value {
        let (status, body) = self
            .post(
                "/api/bot/webhook",
                json!({
                    "phone": phone,
                    "senderName": "Maria",
                    "isGroup": false,
                    "fromMe": false,
                    "text": { "message": text }
                }),
            )
            .await;
        assert_eq!(status, 200);
        body
    }

    async fn operator_says(&self, phone: &str, text: &str) -> Value {
        let (_, body) = self
            .post(
                "/api/bot/webhook",
                json!({ "phone": phone, "fromMe": true, "text": { "message": text } }),
            )
            .await;
        body
    }
}

#[tokio::test]
async fn health_endpoint() {
    let server = TestServer::start().await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn full_intake_over_webhook() {
    let server = TestServer::start().await;
    let phone = "5583999990000";

    for text in ["oi", "fabricacao", "sofa", "nao", "online"] {
        let body = server.customer_says(phone, text).await;
        assert_eq!(body["outcome"], "replied");
    }
    let body = server.customer_says(phone, "25/10/2025 14:30").await;
    assert_eq!(body["outcome"], "finalized");

    let texts = server.channel.texts_for(phone);
    assert_eq!(texts.len(), 6);
    assert!(texts[0].contains("Maria"));
    assert!(texts[5].contains("25/10/2025 14:30"));

    let (status, body) = server.get("/api/intakes").await;
    assert_eq!(status, 200);
    assert_eq!(body["total"], 1);
    let intake = &body["intakes"][0];
    assert_eq!(intake["customerName"], "Maria");
    assert_eq!(intake["phone"], phone);
    assert_eq!(intake["service"], "Fabricação");
    assert_eq!(intake["scheduledFor"], "25/10/2025 14:30");
    assert_eq!(intake["status"], "Pendente");
}

#[tokio::test]
async fn intake_status_can_be_updated_and_filtered() {
    let server = TestServer::start().await;
    server.customer_says("5583", "oi").await;
    server.customer_says("5583", "reforma").await;
    server.customer_says("5583", "cama").await;
    server.customer_says("5583", "pés quebrados").await;
    server.customer_says("5583", "presencial").await;
    server.customer_says("5583", "01/12/2025 09:00").await;

    let (_, body) = server.get("/api/intakes").await;
    let id = body["intakes"][0]["id"].as_i64().unwrap();

    let (status, body) = server
        .post(
            &format!("/api/intakes/{id}/status"),
            json!({ "status": "Concluído" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "Concluído");

    let (_, body) = server.get("/api/intakes?status=Pendente").await;
    assert_eq!(body["total"], 0);
    let (_, body) = server.get("/api/intakes?status=completed&limit=5").await;
    assert_eq!(body["total"], 1);

    let (status, _) = server
        .post("/api/intakes/9999/status", json!({ "status": "Cancelado" }))
        .await;
    assert_eq!(status, 404);

    let (status, _) = server
        .post(&format!("/api/intakes/{id}/status"), json!({ "status": "archived" }))
        .await;
    assert_eq!(status, 400);

    let (status, _) = server.get("/api/intakes?status=bogus").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn operator_takeover_and_manual_resume() {
    let server = TestServer::start().await;
    let phone = "5583988887777";

    server.customer_says(phone, "oi").await;
    let body = server.operator_says(phone, "Oi Maria, aqui é a Ana").await;
    assert_eq!(body["outcome"], "operator_takeover");

    let body = server.customer_says(phone, "fabricacao").await;
    assert_eq!(body["outcome"], "paused");
    assert_eq!(server.channel.texts_for(phone).len(), 1);

    let (_, body) = server.get("/api/bot/paused-users").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["pausedUsers"][0]["userId"], phone);
    assert_eq!(body["pausedUsers"][0]["minutesRemaining"], 120);

    let (_, body) = server.get("/api/bot/status").await;
    assert_eq!(body["status"]["pausedUsers"], 1);
    assert_eq!(body["status"]["activeSessions"], 1);
    assert_eq!(body["status"]["mode"], "menu");

    let (_, body) = server.post(&format!("/api/bot/resume-user/{phone}"), json!({})).await;
    assert_eq!(body["success"], true);
    let (_, body) = server.post(&format!("/api/bot/resume-user/{phone}"), json!({})).await;
    assert_eq!(body["success"], false);

    // Conversation picks up where it stopped.
    let body = server.customer_says(phone, "fabricacao").await;
    assert_eq!(body["outcome"], "replied");
    let texts = server.channel.texts_for(phone);
    assert!(texts.last().unwrap().contains("Sofá"));
}

#[tokio::test]
async fn reactivation_command_and_expiry() {
    let server = TestServer::start().await;
    let phone = "5583911112222";

    server.operator_says(phone, "assumindo").await;
    let body = server.customer_says(phone, "#ATIVAR").await;
    assert_eq!(body["outcome"], "reactivated");
    assert!(server.channel.texts_for(phone)[0].contains("reativado"));

    server.operator_says(phone, "assumindo de novo").await;
    server.clock.advance(TimeDelta::minutes(121));
    let body = server.customer_says(phone, "oi").await;
    assert_eq!(body["outcome"], "replied");

    let (_, body) = server.get("/api/bot/paused-users").await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn group_and_empty_payloads_are_acknowledged() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post(
            "/api/bot/webhook",
            json!({ "phone": "120363-group", "isGroup": true, "text": { "message": "oi" } }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["outcome"], "ignored_group");

    let (status, body) = server.post("/api/bot/webhook", json!({ "status": "READ" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], false);

    let (_, body) = server.get("/api/bot/status").await;
    assert_eq!(body["status"]["activeSessions"], 0);
}

#[tokio::test]
async fn users_are_independent() {
    let server = TestServer::start().await;
    server.customer_says("111", "oi").await;
    server.customer_says("222", "oi").await;
    server.customer_says("111", "fabricacao").await;
    server.operator_says("222", "deixa comigo").await;

    let body = server.customer_says("111", "sofa").await;
    assert_eq!(body["outcome"], "replied");
    let body = server.customer_says("222", "reforma").await;
    assert_eq!(body["outcome"], "paused");
}

#[tokio::test]
async fn operator_voice_note_pauses_the_bot() {
    let server = TestServer::start().await;
    let phone = "5583977776666";

    server.customer_says(phone, "oi").await;
    let (status, body) = server
        .post(
            "/api/bot/webhook",
            json!({
                "phone": phone,
                "fromMe": true,
                "audio": { "audioUrl": "https://example.invalid/voice.ogg" }
            }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["outcome"], "operator_takeover");

    let (_, body) = server.get("/api/bot/paused-users").await;
    assert_eq!(body["total"], 1);

    let body = server.customer_says(phone, "fabricacao").await;
    assert_eq!(body["outcome"], "paused");
    assert_eq!(server.channel.texts_for(phone).len(), 1);
}

#[tokio::test]
async fn echoes_of_bot_replies_do_not_pause() {
    let server = TestServer::start().await;
    let phone = "5583955554444";

    server.customer_says(phone, "oi").await;
    let greeting = server.channel.texts_for(phone)[0].clone();
    let (_, body) = server
        .post(
            "/api/bot/webhook",
            json!({
                "phone": phone,
                "fromMe": true,
                "fromApi": true,
                "text": { "message": greeting }
            }),
        )
        .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["outcome"], "ignored_echo");

    let (_, body) = server.get("/api/bot/paused-users").await;
    assert_eq!(body["total"], 0);
    let body = server.customer_says(phone, "fabricacao").await;
    assert_eq!(body["outcome"], "replied");
}

#[tokio::test]
async fn customer_message_without_text_is_rejected() {
    let server = TestServer::start().await;
    let (status, body) = server
        .post(
            "/api/bot/webhook",
            json!({ "phone": "5583", "fromMe": false, "sticker": { "stickerUrl": "x" } }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], false);

    let (_, body) = server.get("/api/bot/status").await;
    assert_eq!(body["status"]["activeSessions"], 0);
}

#[tokio::test]
async fn intake_stats_and_phone_lookup() {
    let server = TestServer::start().await;
    for phone in ["5583000000001", "5583000000002"] {
        for text in ["oi", "fabricacao", "sofa", "nao", "online", "25/10/2025 14:30"] {
            server.customer_says(phone, text).await;
        }
    }
    for text in ["oi", "reforma", "cama", "pés quebrados", "presencial", "01/12/2025 09:00"] {
        server.customer_says("5583000000001", text).await;
    }

    let (status, body) = server.get("/api/intakes/stats").await;
    assert_eq!(status, 200);
    let stats = &body["stats"];
    assert_eq!(stats["total"], 3);
    assert_eq!(stats["pending"], 3);
    assert_eq!(stats["today"], 3);
    assert_eq!(stats["topServices"][0]["service"], "Fabricação");
    assert_eq!(stats["topServices"][0]["total"], 2);

    let (_, body) = server.get("/api/intakes?phone=5583000000001").await;
    assert_eq!(body["total"], 2);
    let (_, body) = server.get("/api/intakes?phone=5583000000002&limit=1").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["intakes"][0]["service"], "Fabricação");
}
