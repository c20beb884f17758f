//! Router-level integration tests: a real server bound to an ephemeral
//! port, driven with `reqwest`, against a real Postgres instance —
//! mirroring the teacher's own `TestServer` pattern.

use std::sync::Arc;

use rapo_api::router::build_router;
use rapo_api::state::AppState;
use rapo_db::Gateway;
use serde_json::{json, Value};
use sqlx::PgPool;

struct TestServer {
    base_url: String,
}

impl TestServer {
    async fn start(pool: PgPool) -> Self {
        let state = Arc::new(AppState {
            gateway: Gateway::from_pool(pool, 63),
            bearer_token: "test-token".to_string(),
        });
        let router = build_router(state, None);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        TestServer {
            base_url: format!("http://{addr}"),
        }
    }

    fn client(&self) -> reqwest::Client {
        reqwest::Client::new()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn unauthenticated_requests_are_rejected(pool: PgPool) -> sqlx::Result<()> {
    let server = TestServer::start(pool).await;
    let response = server
        .client()
        .get(server.url("/api/get-all-controls"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn save_control_inserts_then_lists_it(pool: PgPool) -> sqlx::Result<()> {
    let server = TestServer::start(pool).await;

    let response = server
        .client()
        .post(server.url("/api/save-control"))
        .bearer_auth("test-token")
        .json(&json!({
            "control_name": "daily_revenue",
            "control_type": "ANL",
            "source_name": "rapo_test_revenue",
            "source_date_field": "event_date",
            "error_config": "amount < 0",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    let control_id = body["control_id"].as_i64().expect("control_id in response");

    let response = server
        .client()
        .get(server.url("/api/get-all-controls"))
        .bearer_auth("test-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let controls: Vec<Value> = response.json().await.unwrap();
    assert!(controls
        .iter()
        .any(|c| c["control_id"].as_i64() == Some(control_id) && c["control_name"] == "daily_revenue"));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn cancel_control_clears_status_without_deleting_the_log_row(pool: PgPool) -> sqlx::Result<()> {
    let (control_id,): (i64,) = sqlx::query_as(
        "INSERT INTO rapo_config (control_name, control_type) VALUES ('daily_revenue', 'ANL') \
         RETURNING control_id",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    let (process_id,): (i64,) = sqlx::query_as(
        "INSERT INTO rapo_log (control_id, status, date_from, date_to) \
         VALUES ($1, 'P', now(), now()) RETURNING process_id",
    )
    .bind(control_id)
    .fetch_one(&pool)
    .await
    .unwrap();

    let server = TestServer::start(pool.clone()).await;
    let response = server
        .client()
        .post(server.url(&format!("/api/cancel-control?id={process_id}")))
        .bearer_auth("test-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

    let (status,): (Option<String>,) = sqlx::query_as("SELECT status FROM rapo_log WHERE process_id = $1")
        .bind(process_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, None, "cancel-control only clears status; the supervisor finishes the job");
    Ok(())
}
