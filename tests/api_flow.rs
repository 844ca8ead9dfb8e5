//! Integration tests for the REST API.
//!
//! Each test spins up an Axum server on a random port with an in-memory
//! store behind it and exercises the real HTTP contract.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::time::timeout;

use rfp_desk::api::{ApiState, api_routes};
use rfp_desk::store::{Database, LibSqlBackend};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Start a server on a random port, return (port, db).
async fn start_server() -> (u16, Arc<dyn Database>) {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let app = api_routes(ApiState {
        db: Arc::clone(&db),
        mailer: None,
        wake: Arc::new(Notify::new()),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, db)
}

async fn get(port: u16, path: &str) -> reqwest::Response {
    reqwest::get(format!("http://127.0.0.1:{port}{path}"))
        .await
        .unwrap()
}

async fn post_json(port: u16, path: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}{path}"))
        .json(&body)
        .send()
        .await
        .unwrap()
}

/// Draft an RFP over the API and return its JSON.
async fn draft_rfp(port: u16, text: &str) -> Value {
    let resp = post_json(port, "/api/rfps", serde_json::json!({"text": text})).await;
    assert_eq!(resp.status(), 201);
    resp.json().await.unwrap()
}

// ── Health ───────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ok() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;

        let resp = get(port, "/api/health").await;
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    })
    .await
    .expect("test timed out");
}

// ── RFP drafting and retrieval ───────────────────────────────────────

#[tokio::test]
async fn drafting_pulls_structure_out_of_free_text() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;

        let rfp = draft_rfp(
            port,
            "We need 20 laptops and 15 monitors for the new office. \
             Budget $50,000. Needed within 30 days.",
        )
        .await;

        assert_eq!(rfp["title"], "We need 20 laptops and 15 monitors for the new office");
        assert_eq!(rfp["budget"], "50000");
        assert!(rfp["deadline"].is_string());
        assert_eq!(rfp["status"], "open");

        let items = rfp["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["name"], "Laptops");
        assert_eq!(items[0]["quantity"], 20);
        assert_eq!(items[1]["name"], "Monitors");
        assert_eq!(items[1]["quantity"], 15);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rfps_can_be_listed_and_fetched() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;

        let rfp = draft_rfp(port, "One hundred chairs, budget $8,000.").await;
        let id = rfp["id"].as_i64().unwrap();

        let list: Vec<Value> = get(port, "/api/rfps").await.json().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["id"], id);

        let resp = get(port, &format!("/api/rfps/{id}")).await;
        assert_eq!(resp.status(), 200);
        let fetched: Value = resp.json().await.unwrap();
        assert_eq!(fetched["id"], id);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn fetching_a_missing_rfp_returns_404() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;

        let resp = get(port, "/api/rfps/999").await;
        assert_eq!(resp.status(), 404);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].is_string());
    })
    .await
    .expect("test timed out");
}

// ── Vendors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn vendor_registration_round_trips() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;

        let resp = post_json(
            port,
            "/api/vendors",
            serde_json::json!({"name": "Acme Corp", "email": "sales@acme.test"}),
        )
        .await;
        assert_eq!(resp.status(), 201);
        let vendor: Value = resp.json().await.unwrap();
        assert_eq!(vendor["name"], "Acme Corp");

        let list: Vec<Value> = get(port, "/api/vendors").await.json().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["email"], "sales@acme.test");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn duplicate_vendor_emails_conflict() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;

        let vendor = serde_json::json!({"name": "Acme Corp", "email": "sales@acme.test"});
        assert_eq!(post_json(port, "/api/vendors", vendor.clone()).await.status(), 201);
        assert_eq!(post_json(port, "/api/vendors", vendor).await.status(), 409);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn vendors_need_a_name_and_an_email() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;

        let resp = post_json(
            port,
            "/api/vendors",
            serde_json::json!({"name": "", "email": "x@y.test"}),
        )
        .await;
        assert_eq!(resp.status(), 400);
    })
    .await
    .expect("test timed out");
}

// ── Dispatch ─────────────────────────────────────────────────────────

#[tokio::test]
async fn sending_without_smtp_is_unavailable() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;

        let rfp = draft_rfp(port, "Fifty desks, budget $20,000.").await;
        let id = rfp["id"].as_i64().unwrap();

        let resp = post_json(
            port,
            &format!("/api/rfps/{id}/send"),
            serde_json::json!({"vendor_ids": [1]}),
        )
        .await;
        assert_eq!(resp.status(), 503);
    })
    .await
    .expect("test timed out");
}

// ── Simulated replies ────────────────────────────────────────────────

const QUOTE_BODY: &str = "We quote a total of $39,000. Delivery in 30 days. \
    2 years warranty included. Payment terms: Net45.";

#[tokio::test]
async fn a_simulated_reply_runs_the_real_pipeline() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;

        let rfp = draft_rfp(port, "Laptops for the office. Budget $50,000.").await;
        let id = rfp["id"].as_i64().unwrap();

        let resp = post_json(
            port,
            &format!("/api/rfps/{id}/simulate-reply"),
            serde_json::json!({"body": QUOTE_BODY}),
        )
        .await;
        assert_eq!(resp.status(), 201);

        let proposal: Value = resp.json().await.unwrap();
        assert_eq!(proposal["rfp_id"], id);
        assert_eq!(proposal["vendor"], "simulated@localhost");
        assert_eq!(proposal["terms"]["total_price"], "39000");
        assert_eq!(proposal["terms"]["currency"], "$");
        assert_eq!(proposal["terms"]["delivery_days"], 30);
        // 50 base + 7 price (22% under budget) + 5 delivery + 3 warranty.
        assert_eq!(proposal["score"], 65);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn replaying_the_same_reply_is_flagged_as_duplicate() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;

        let rfp = draft_rfp(port, "Laptops for the office. Budget $50,000.").await;
        let id = rfp["id"].as_i64().unwrap();
        let reply = serde_json::json!({"body": QUOTE_BODY});

        let first = post_json(port, &format!("/api/rfps/{id}/simulate-reply"), reply.clone()).await;
        assert_eq!(first.status(), 201);

        let second = post_json(port, &format!("/api/rfps/{id}/simulate-reply"), reply).await;
        assert_eq!(second.status(), 200);
        let body: Value = second.json().await.unwrap();
        assert_eq!(body["duplicate"], true);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn simulated_replies_resolve_known_vendors() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;

        let rfp = draft_rfp(port, "Laptops for the office. Budget $50,000.").await;
        let id = rfp["id"].as_i64().unwrap();

        let vendor: Value = post_json(
            port,
            "/api/vendors",
            serde_json::json!({"name": "Acme Corp", "email": "sales@acme.test"}),
        )
        .await
        .json()
        .await
        .unwrap();

        let resp = post_json(
            port,
            &format!("/api/rfps/{id}/simulate-reply"),
            serde_json::json!({"vendor_email": "sales@acme.test", "body": QUOTE_BODY}),
        )
        .await;
        let proposal: Value = resp.json().await.unwrap();
        assert_eq!(proposal["vendor"], vendor["id"].as_i64().unwrap().to_string());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn simulating_against_a_missing_rfp_returns_404() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;

        let resp = post_json(
            port,
            "/api/rfps/999/simulate-reply",
            serde_json::json!({"body": QUOTE_BODY}),
        )
        .await;
        assert_eq!(resp.status(), 404);
    })
    .await
    .expect("test timed out");
}

// ── Comparison ───────────────────────────────────────────────────────

#[tokio::test]
async fn compare_ranks_proposals_and_marks_the_best() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;

        let rfp = draft_rfp(port, "Laptops for the office. Budget $50,000.").await;
        let id = rfp["id"].as_i64().unwrap();

        // Three distinct offers: 65, 63, and 39 points.
        let offers = [
            ("a@one.test", "Total: $39,000. Delivery in 30 days. 2 years warranty."),
            ("b@two.test", "Total: $45,000. Delivery in 10 days."),
            ("c@three.test", "Total: $60,000. Delivery in 40 days."),
        ];
        for (sender, body) in offers {
            let resp = post_json(
                port,
                &format!("/api/rfps/{id}/simulate-reply"),
                serde_json::json!({"vendor_email": sender, "body": body}),
            )
            .await;
            assert_eq!(resp.status(), 201);
        }

        let resp = get(port, &format!("/api/rfps/{id}/compare")).await;
        assert_eq!(resp.status(), 200);
        let comparison: Value = resp.json().await.unwrap();

        assert_eq!(comparison["budget"], "50000");
        let proposals = comparison["proposals"].as_array().unwrap();
        assert_eq!(proposals.len(), 3);
        assert_eq!(proposals[0]["vendor"], "a@one.test");
        assert_eq!(proposals[0]["score"], 65);
        assert_eq!(proposals[1]["vendor"], "b@two.test");
        assert_eq!(proposals[1]["score"], 63);
        assert_eq!(proposals[2]["vendor"], "c@three.test");
        assert_eq!(proposals[2]["score"], 39);
        assert_eq!(comparison["best_proposal_id"], proposals[0]["id"]);
    })
    .await
    .expect("test timed out");
}
