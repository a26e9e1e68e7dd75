//! HTTP end-to-end tests: a real server on an ephemeral port driven with
//! `reqwest`.

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

use notemerge_core::config::AppConfig;
use notemerge_core::db::Database;
use notemerge_web::WebServer;

struct TestServer {
    _dir: TempDir,
    base: String,
    client: Client,
}

impl TestServer {
    async fn start(password: Option<&str>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::new(dir.path().join("notemerge.db")).unwrap());
        db.initialize().unwrap();

        let mut config = AppConfig::default();
        config.web.admin_password = password.map(str::to_string);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = WebServer::new(config, db);
        tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });

        Self {
            _dir: dir,
            base: format!("http://{addr}"),
            client: Client::new(),
        }
    }

    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        user: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.base, path))
            .header("x-user-id", user);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn post(&self, path: &str, user: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, path, user, Some(body)).await
    }

    async fn put(&self, path: &str, user: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::PUT, path, user, Some(body)).await
    }

    async fn get(&self, path: &str, user: &str) -> (StatusCode, Value) {
        self.send(reqwest::Method::GET, path, user, None).await
    }

    async fn create_note(&self, owner: &str, content: &str) -> String {
        let (status, body) = self
            .post(
                "/api/notes",
                owner,
                json!({ "title": "Plan", "content": content, "visibility": "public" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn fork(&self, note_id: &str, user: &str) -> String {
        let (status, body) = self
            .post(&format!("/api/notes/{note_id}/fork"), user, json!({}))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["forkNote"]["id"].as_str().unwrap().to_string()
    }

    async fn open_pr(&self, author: &str, source: &str, target: &str) -> String {
        let (status, body) = self
            .post(
                "/api/prs",
                author,
                json!({
                    "title": "Edits",
                    "description": "please merge",
                    "sourceNoteId": source,
                    "targetNoteId": target,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["status"], "open");
        body["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_health_needs_no_identity() {
    let server = TestServer::start(None).await;
    let resp = server
        .client
        .get(format!("{}/api/status/health", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let server = TestServer::start(None).await;
    let resp = server
        .client
        .get(format!("{}/api/prs", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn test_clean_merge_flow() {
    let server = TestServer::start(None).await;
    let note = server.create_note("alice", "a\nb\nc").await;
    let fork = server.fork(&note, "bob").await;

    let (status, _) = server
        .put(&format!("/api/notes/{fork}"), "bob", json!({ "content": "a\nB\nc" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let pr = server.open_pr("bob", &fork, &note).await;

    let (status, pending) = server.get("/api/prs?status=open", "alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let (status, details) = server.get(&format!("/api/prs/{pr}"), "alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["mergeable"], true);
    assert_eq!(details["currentTargetContent"], "a\nb\nc");

    let (status, diff) = server.get(&format!("/api/prs/{pr}/diff"), "alice").await;
    assert_eq!(status, StatusCode::OK);
    assert!(diff["sourcePatch"].as_str().unwrap().contains("+B"));

    // The author cannot merge into someone else's document.
    let (status, body) = server
        .post(&format!("/api/prs/{pr}/merge"), "bob", json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    let (status, merged) = server
        .post(&format!("/api/prs/{pr}/merge"), "alice", json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{merged}");
    assert_eq!(merged["mergedContent"], "a\nB\nc");
    assert_eq!(merged["pr"]["status"], "merged");

    let (_, note_body) = server.get(&format!("/api/notes/{note}"), "alice").await;
    assert_eq!(note_body["content"], "a\nB\nc");

    // A second merge is an invalid transition.
    let (status, _) = server
        .post(&format!("/api/prs/{pr}/merge"), "alice", json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, pending) = server.get("/api/prs", "alice").await;
    assert!(pending.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_conflict_then_resolve() {
    let server = TestServer::start(None).await;
    let note = server.create_note("alice", "x\ny").await;
    let fork = server.fork(&note, "bob").await;
    server
        .put(&format!("/api/notes/{fork}"), "bob", json!({ "content": "x\nbob" }))
        .await;
    let pr = server.open_pr("bob", &fork, &note).await;
    server
        .put(&format!("/api/notes/{note}"), "alice", json!({ "content": "x\nalice" }))
        .await;

    let (status, body) = server
        .post(&format!("/api/prs/{pr}/merge"), "alice", json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["code"], "conflict");
    let conflicts = body["conflicts"].as_array().unwrap();
    assert_eq!(conflicts.len(), 1);

    let (_, details) = server.get(&format!("/api/prs/{pr}"), "alice").await;
    assert_eq!(details["status"], "open");
    assert_eq!(details["mergeable"], false);
    assert_eq!(details["mergeConflicts"].as_array().unwrap().len(), 1);

    // Blank resolutions are rejected.
    let (status, _) = server
        .post(
            &format!("/api/prs/{pr}/resolve"),
            "alice",
            json!({ "resolvedContent": "   " }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, resolved) = server
        .post(
            &format!("/api/prs/{pr}/resolve"),
            "alice",
            json!({ "resolvedContent": "x\nbob and alice" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{resolved}");
    assert_eq!(resolved["pr"]["status"], "merged");

    let (_, note_body) = server.get(&format!("/api/notes/{note}"), "alice").await;
    assert_eq!(note_body["content"], "x\nbob and alice");
}

#[tokio::test]
async fn test_close_and_missing_resources() {
    let server = TestServer::start(None).await;
    let note = server.create_note("alice", "text").await;
    let fork = server.fork(&note, "bob").await;
    let pr = server.open_pr("bob", &fork, &note).await;

    let (status, _) = server
        .post(&format!("/api/prs/{pr}/close"), "mallory", json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, closed) = server
        .post(&format!("/api/prs/{pr}/close"), "bob", json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["status"], "closed");

    let (status, _) = server
        .post(&format!("/api/prs/{pr}/close"), "bob", json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server.get("/api/prs/does-not-exist", "alice").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server
        .post("/api/notes/does-not-exist/fork", "bob", json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server
        .post(
            "/api/prs",
            "bob",
            json!({ "title": "x", "sourceNoteId": fork, "targetNoteId": "gone" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server
        .post(
            "/api/prs",
            "bob",
            json!({ "title": " ", "sourceNoteId": fork, "targetNoteId": note }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server.get("/api/prs?status=merged", "alice").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, audit) = server.get("/api/audit?limit=10", "alice").await;
    assert_eq!(status, StatusCode::OK);
    assert!(audit["total"].as_u64().unwrap() >= 4);
}

#[tokio::test]
async fn test_login_session_flow() {
    let server = TestServer::start(Some("hunter2")).await;

    let resp = server
        .client
        .post(format!("{}/api/auth/login", server.base))
        .json(&json!({ "userId": "alice", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = server
        .client
        .post(format!("{}/api/auth/login", server.base))
        .json(&json!({ "userId": "alice", "password": "hunter2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let login: Value = resp.json().await.unwrap();
    let token = login["token"].as_str().unwrap().to_string();

    // X-User-Id alone is not enough once a password is configured.
    let (status, _) = server.get("/api/prs", "alice").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let resp = server
        .client
        .post(format!("{}/api/notes", server.base))
        .bearer_auth(&token)
        .json(&json!({ "title": "Mine", "content": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let note: Value = resp.json().await.unwrap();
    assert_eq!(note["ownerId"], "alice");
    assert_eq!(note["visibility"], "private");

    let resp = server
        .client
        .post(format!("{}/api/auth/logout", server.base))
        .json(&json!({ "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = server
        .client
        .get(format!("{}/api/prs", server.base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_private_note_cannot_be_forked_or_proposed_by_strangers() {
    let server = TestServer::start(None).await;
    let (status, body) = server
        .post(
            "/api/notes",
            "alice",
            json!({ "title": "Diary", "content": "s3cret", "visibility": "private" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let private = body["id"].as_str().unwrap().to_string();
    let public = server.create_note("mallory", "hello").await;

    let (status, _) = server.get(&format!("/api/notes/{private}"), "mallory").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = server
        .post(&format!("/api/notes/{private}/fork"), "mallory", json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert_eq!(body["code"], "forbidden");
    assert!(!body.to_string().contains("s3cret"));

    for (source, target) in [(&private, &public), (&public, &private)] {
        let (status, body) = server
            .post(
                "/api/prs",
                "mallory",
                json!({
                    "title": "Peek",
                    "sourceNoteId": source,
                    "targetNoteId": target,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
        assert!(!body.to_string().contains("s3cret"));
    }

    // The owner still forks their own private note.
    server.fork(&private, "alice").await;
}

#[tokio::test]
async fn test_bad_json_bodies_are_bad_requests() {
    let server = TestServer::start(None).await;
    let note = server.create_note("alice", "a\nb").await;
    let fork = server.fork(&note, "bob").await;
    let pr = server.open_pr("bob", &fork, &note).await;

    for body in [json!({}), json!({ "resolvedContent": null })] {
        let (status, reply) = server
            .post(&format!("/api/prs/{pr}/resolve"), "alice", body)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{reply}");
        assert_eq!(reply["code"], "bad_request");
        assert!(reply["error"].is_string());
    }

    let (status, reply) = server
        .post("/api/prs", "bob", json!({ "title": 42 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{reply}");
    assert_eq!(reply["code"], "bad_request");

    let resp = server
        .client
        .put(format!("{}/api/notes/{fork}", server.base))
        .header("x-user-id", "bob")
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let reply: Value = resp.json().await.unwrap();
    assert_eq!(reply["code"], "bad_request");

    // The pull request is untouched by the rejected attempts.
    let (status, details) = server.get(&format!("/api/prs/{pr}"), "alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["status"], "open");
}
