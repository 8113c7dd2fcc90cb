//! Integration tests for the REST client against a mock backend

mod common;

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use common::{signed_in_harness, FakeIdentityProvider, Harness};
use manuel_core::api::ApiClient;
use manuel_core::models::ExportFormat;
use manuel_core::retry::{RequestExecutor, RetryPolicy};
use manuel_core::ErrorKind;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;

/// Short waits so the real clock is barely involved
fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
        max_retries: 3,
        rate_limit_max_retries: 2,
    }
}

fn client(h: &Harness, server: &ServerGuard) -> ApiClient {
    let executor = Arc::new(RequestExecutor::new(h.session.clone(), fast_policy()));
    ApiClient::with_client(reqwest::Client::new(), &server.url(), executor)
}

async fn bearer(h: &Harness) -> String {
    format!("Bearer {}", h.session.current_credentials().await.unwrap().id_token)
}

#[tokio::test]
async fn list_manuals_sends_id_token() {
    //* Given
    let h = signed_in_harness().await;
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/manuals")
        .match_header("authorization", bearer(&h).await.as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"manuals":[
                {"manualId":"m-1","name":"Dishwasher X200","sizeBytes":2516582,"pages":48},
                {"id":"m-2","fileName":"oven.pdf"}
            ]}"#,
        )
        .expect(1)
        .create_async()
        .await;

    //* When
    let manuals = client(&h, &server).list_manuals().await.expect("list manuals");

    //* Then
    mock.assert_async().await;
    assert_eq!(manuals.len(), 2);
    assert_eq!(manuals[0].id, "m-1");
    assert_eq!(manuals[1].display_name(), "oven.pdf");
}

#[tokio::test]
async fn unauthorized_response_refreshes_and_repeats() {
    //* Given
    let h = signed_in_harness().await;
    let mut server = Server::new_async().await;
    let rejected = server
        .mock("GET", "/usage/stats")
        .match_header("authorization", bearer(&h).await.as_str())
        .with_status(401)
        .with_body(r#"{"message":"Unauthorized"}"#)
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("GET", "/usage/stats")
        .match_header("authorization", Matcher::Regex("^Bearer .+".to_string()))
        .with_status(200)
        .with_body(r#"{"totalQueries":12,"textQueries":9,"voiceQueries":3,"totalCost":0.41}"#)
        .expect(1)
        .create_async()
        .await;

    //* When
    let stats = client(&h, &server).usage_stats().await.expect("stats after refresh");

    //* Then
    rejected.assert_async().await;
    accepted.assert_async().await;
    assert_eq!(stats.total_queries, 12);
    assert_eq!(FakeIdentityProvider::count(&h.provider.refresh_calls), 1);
}

#[tokio::test]
async fn rate_limited_query_waits_and_retries() {
    //* Given
    let h = signed_in_harness().await;
    let mut server = Server::new_async().await;
    let limited = server
        .mock("POST", "/query/text")
        .with_status(429)
        .with_header("retry-after", "0")
        .expect(1)
        .create_async()
        .await;
    let answered = server
        .mock("POST", "/query/text")
        .match_body(Matcher::PartialJson(json!({
            "question": "How do I descale?",
            "manualId": "m-1",
        })))
        .with_status(200)
        .with_body(r#"{"answer":"Run the descale cycle.","sources":[{"manualName":"X200","page":12}]}"#)
        .expect(1)
        .create_async()
        .await;

    //* When
    let response = client(&h, &server)
        .ask("  How do I descale?  ", Some("m-1"))
        .await
        .expect("answer after retry");

    //* Then
    limited.assert_async().await;
    answered.assert_async().await;
    assert_eq!(response.answer, "Run the descale cycle.");
    assert_eq!(response.sources.len(), 1);
}

#[tokio::test]
async fn persistent_rate_limit_surfaces_after_retries() {
    //* Given
    let h = signed_in_harness().await;
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/query/text")
        .with_status(429)
        .with_header("retry-after", "0")
        .expect(3)
        .create_async()
        .await;

    //* When
    let err = client(&h, &server).ask("Hello?", None).await.unwrap_err();

    //* Then
    mock.assert_async().await;
    assert_eq!(err.kind(), ErrorKind::RateLimited);
}

#[tokio::test]
async fn server_errors_are_retried() {
    //* Given
    let h = signed_in_harness().await;
    let mut server = Server::new_async().await;
    let failing = server
        .mock("GET", "/usage/quotas")
        .with_status(503)
        .with_body("unavailable")
        .expect(2)
        .create_async()
        .await;
    let ok = server
        .mock("GET", "/usage/quotas")
        .with_status(200)
        .with_body(r#"{"queriesUsed":40,"queriesLimit":100}"#)
        .expect(1)
        .create_async()
        .await;

    //* When
    let quotas = client(&h, &server).usage_quotas().await.expect("quotas");

    //* Then
    failing.assert_async().await;
    ok.assert_async().await;
    assert_eq!(quotas.queries_remaining(), Some(60));
}

#[tokio::test]
async fn not_found_is_not_retried() {
    //* Given
    let h = signed_in_harness().await;
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/manuals/missing/download")
        .with_status(404)
        .with_body(r#"{"message":"Manual not found"}"#)
        .expect(1)
        .create_async()
        .await;

    //* When
    let err = client(&h, &server)
        .manual_download_link("missing")
        .await
        .unwrap_err();

    //* Then
    mock.assert_async().await;
    assert_eq!(err.kind(), ErrorKind::Permanent);
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn delete_accepts_empty_body() {
    //* Given
    let h = signed_in_harness().await;
    let mut server = Server::new_async().await;
    let mock = server
        .mock("DELETE", "/manuals/m-1")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    //* When
    let result = client(&h, &server).delete_manual("m-1").await;

    //* Then
    mock.assert_async().await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn upload_sends_base64_content() {
    //* Given
    let h = signed_in_harness().await;
    let mut server = Server::new_async().await;
    let content = b"%PDF-1.4 fake manual";
    let mock = server
        .mock("POST", "/manuals")
        .match_body(Matcher::PartialJson(json!({
            "fileName": "x200.pdf",
            "contentType": "application/pdf",
            "content": STANDARD.encode(content),
        })))
        .with_status(201)
        .with_body(r#"{"manualId":"m-9","name":"x200.pdf","status":"processing"}"#)
        .expect(1)
        .create_async()
        .await;

    //* When
    let manual = client(&h, &server)
        .upload_manual("x200.pdf", "application/pdf", content)
        .await
        .expect("upload");

    //* Then
    mock.assert_async().await;
    assert_eq!(manual.id, "m-9");
    assert_eq!(manual.status.as_deref(), Some("processing"));
}

#[tokio::test]
async fn download_follows_presigned_link_without_bearer() {
    //* Given
    let h = signed_in_harness().await;
    let mut server = Server::new_async().await;
    let link = server
        .mock("GET", "/manuals/m-1/download")
        .with_status(200)
        .with_body(json!({ "downloadUrl": format!("{}/files/m-1.pdf", server.url()) }).to_string())
        .expect(1)
        .create_async()
        .await;
    let file = server
        .mock("GET", "/files/m-1.pdf")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body("%PDF-1.4")
        .expect(1)
        .create_async()
        .await;

    //* When
    let bytes = client(&h, &server).download_manual("m-1").await.expect("download");

    //* Then
    link.assert_async().await;
    file.assert_async().await;
    assert_eq!(bytes, b"%PDF-1.4");
}

#[tokio::test]
async fn usage_history_and_export_pass_query_parameters() {
    //* Given
    let h = signed_in_harness().await;
    let mut server = Server::new_async().await;
    let history = server
        .mock("GET", "/usage/history?limit=5")
        .with_status(200)
        .with_body(r#"{"items":[{"timestamp":"2024-05-01T09:30:00Z","queryType":"text"}]}"#)
        .expect(1)
        .create_async()
        .await;
    let export = server
        .mock("GET", "/usage/export?format=csv")
        .with_status(200)
        .with_body(r#"{"format":"csv","data":"timestamp,type\n"}"#)
        .expect(1)
        .create_async()
        .await;
    let api = client(&h, &server);

    //* When
    let entries = api.usage_history(5).await.expect("history");
    let exported = api.export_usage(ExportFormat::Csv).await.expect("export");

    //* Then
    history.assert_async().await;
    export.assert_async().await;
    assert_eq!(entries.entries.len(), 1);
    assert!(exported.data.starts_with("timestamp"));
}

#[tokio::test]
async fn empty_question_is_rejected_locally() {
    //* Given
    let h = signed_in_harness().await;
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/query/text")
        .expect(0)
        .create_async()
        .await;

    //* When
    let err = client(&h, &server).ask("   ", None).await.unwrap_err();

    //* Then
    mock.assert_async().await;
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn signed_out_client_makes_no_requests() {
    //* Given
    let h = signed_in_harness().await;
    h.session.sign_out().await.unwrap();
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/manuals")
        .expect(0)
        .create_async()
        .await;

    //* When
    let err = client(&h, &server).list_manuals().await.unwrap_err();

    //* Then
    mock.assert_async().await;
    assert_eq!(err.kind(), ErrorKind::Authentication);
}
