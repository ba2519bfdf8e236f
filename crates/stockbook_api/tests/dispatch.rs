//! End-to-end tests of the dispatch stack over an in-process transport:
//! admission control, retry classification, typed decoding, and the
//! cancellation/slot-release contract.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderValue, Response, StatusCode, header};
use serde_json::{Value, json};
use tokio::time::Instant;
use tower::service_fn;
use tower::util::BoxCloneService;

use stockbook_api::admission::AdmissionSettings;
use stockbook_api::transport::{ApiRequest, HttpService, TransportError, TransportResponse};
use stockbook_api::{ApiClient, ClientConfig, Credential, Error};

const BASE_URL: &str = "https://api.stockbook.test/api/v2";

fn json_response(status: u16, body: Value) -> TransportResponse {
    let mut response = Response::new(Bytes::from(body.to_string()));
    *response.status_mut() = StatusCode::from_u16(status).expect("valid status");
    response
}

fn empty_response(status: u16) -> TransportResponse {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = StatusCode::from_u16(status).expect("valid status");
    response
}

fn admission(rate: f64, burst: u32, concurrent: usize) -> AdmissionSettings {
    AdmissionSettings::builder()
        .queries_per_second(rate)
        .burst(burst)
        .max_concurrent(concurrent)
        .build()
}

fn config(settings: AdmissionSettings) -> ClientConfig {
    ClientConfig::builder()
        .base_url(BASE_URL)
        .credential(Credential::Bearer("test-token".into()))
        .admission(settings)
        .retry_max_attempts(3)
        .retry_initial_backoff_ms(100)
        .build()
}

fn client_over<F, Fut>(settings: AdmissionSettings, handler: F) -> ApiClient
where
    F: FnMut(ApiRequest) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<TransportResponse, TransportError>> + Send + 'static,
{
    let transport: HttpService = BoxCloneService::new(service_fn(handler));
    ApiClient::with_transport(config(settings), transport).expect("client built")
}

#[tokio::test(start_paused = true)]
async fn five_requests_serialize_through_both_gates() {
    // rate 2/sec, concurrency 1, instant server: completions land at
    // ~0, 0.5, 1.0, 1.5, 2.0 seconds, not faster.
    let client = client_over(admission(2.0, 1, 1), |_request: ApiRequest| async {
        Ok(json_response(200, json!({"ok": true})))
    });

    let started = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..5 {
        let endpoint = client.endpoint("entity/product");
        handles.push(tokio::spawn(async move {
            endpoint
                .request::<Value>("")
                .get()
                .await
                .expect("request succeeded");
            Instant::now()
        }));
    }

    let mut offsets = Vec::new();
    for handle in handles {
        offsets.push(handle.await.expect("task completed") - started);
    }
    offsets.sort();

    for (i, offset) in offsets.iter().enumerate() {
        let expected = Duration::from_millis(500) * i as u32;
        assert!(
            *offset >= expected && *offset <= expected + Duration::from_millis(100),
            "request {i} completed at {offset:?}, expected ~{expected:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn retried_429_yields_the_same_value_as_immediate_success() {
    let product = json!({"id": "p-1", "name": "Bolt M4"});

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let body = product.clone();
    let flaky = client_over(admission(1000.0, 1000, 5), move |_request: ApiRequest| {
        let attempt = seen.fetch_add(1, Ordering::SeqCst);
        let body = body.clone();
        async move {
            if attempt < 2 {
                Ok(json_response(429, json!({"errors": [{"message": "limit"}]})))
            } else {
                Ok(json_response(200, body))
            }
        }
    });

    let body = product.clone();
    let healthy = client_over(admission(1000.0, 1000, 5), move |_request: ApiRequest| {
        let body = body.clone();
        async move { Ok(json_response(200, body)) }
    });

    let from_flaky: Value = flaky
        .endpoint("entity/product")
        .request("p-1")
        .get()
        .await
        .expect("retries absorbed the 429s");
    let from_healthy: Value = healthy
        .endpoint("entity/product")
        .request("p-1")
        .get()
        .await
        .expect("no retries needed");

    assert_eq!(from_flaky, from_healthy);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn client_errors_are_surfaced_verbatim_after_one_attempt() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let client = client_over(admission(1000.0, 1000, 5), move |_request: ApiRequest| {
        seen.fetch_add(1, Ordering::SeqCst);
        async {
            Ok(json_response(
                404,
                json!({"errors": [{"message": "entity not found", "code": 1002}]}),
            ))
        }
    });

    let result = client
        .endpoint("entity/product")
        .request::<Value>("missing")
        .get()
        .await;
    match result {
        Err(Error::Api { status, errors }) => {
            assert_eq!(status, 404);
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].message, "entity not found");
            assert_eq!(errors[0].code, Some(1002));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1, "404 must be attempted exactly once");
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_surface_the_final_rate_limit_status() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let client = client_over(admission(1000.0, 1000, 5), move |_request: ApiRequest| {
        seen.fetch_add(1, Ordering::SeqCst);
        async { Ok(json_response(429, json!({"errors": [{"message": "over quota"}]}))) }
    });

    let result = client
        .endpoint("entity/product")
        .request::<Value>("")
        .get()
        .await;
    match result {
        Err(Error::Api { status, .. }) => assert_eq!(status, 429),
        other => panic!("expected Api error, got {other:?}"),
    }
    // One initial attempt plus the configured three retries.
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn transport_failures_are_distinguished_from_rejections() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let client = client_over(admission(1000.0, 1000, 5), move |_request: ApiRequest| {
        seen.fetch_add(1, Ordering::SeqCst);
        async { Err::<TransportResponse, _>(TransportError::Timeout) }
    });

    let result = client
        .endpoint("entity/product")
        .request::<Value>("")
        .get()
        .await;
    assert!(matches!(result, Err(Error::Transport { .. })));
    assert_eq!(
        calls.load(Ordering::SeqCst),
        1,
        "transport failures are left to the transport's own settings"
    );
}

#[tokio::test]
async fn delete_maps_success_to_true_and_rejection_to_an_api_error() {
    let client = client_over(admission(1000.0, 1000, 5), |request: ApiRequest| async move {
        if request.url.ends_with("entity/product/p-1") {
            Ok(empty_response(200))
        } else {
            Ok(json_response(
                404,
                json!({"errors": [{"message": "entity not found"}]}),
            ))
        }
    });

    let endpoint = client.endpoint("entity/product");
    let deleted = endpoint
        .request::<Value>("p-1")
        .delete()
        .await
        .expect("empty 200 maps to success");
    assert!(deleted);

    let missing = endpoint.request::<Value>("ghost").delete().await;
    match missing {
        Err(Error::Api { status, errors }) => {
            assert_eq!(status, 404);
            assert_eq!(errors[0].message, "entity not found");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn decode_mismatch_is_not_an_application_error() {
    let client = client_over(admission(1000.0, 1000, 5), |_request: ApiRequest| async {
        let mut response = Response::new(Bytes::from_static(b"<html>surprise</html>"));
        *response.status_mut() = StatusCode::OK;
        Ok(response)
    });

    let result = client
        .endpoint("entity/product")
        .request::<Value>("")
        .get()
        .await;
    match result {
        Err(Error::Decode { status, .. }) => assert_eq!(status, 200),
        other => panic!("expected Decode error, got {other:?}"),
    }
    assert_eq!(client.in_flight(), 0, "decode failures must still release the slot");
}

#[tokio::test(start_paused = true)]
async fn cancelled_request_frees_the_slot_for_queued_work() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let client = client_over(admission(1000.0, 1000, 1), move |_request: ApiRequest| {
        let attempt = seen.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt == 0 {
                // First request hangs until cancelled.
                futures::future::pending::<()>().await;
            }
            Ok(json_response(200, json!({"ok": true})))
        }
    });

    let stuck = tokio::spawn({
        let endpoint = client.endpoint("entity/product");
        async move { endpoint.request::<Value>("").get().await }
    });
    for _ in 0..50 {
        tokio::task::yield_now().await;
        if client.in_flight() == 1 {
            break;
        }
    }
    assert_eq!(client.in_flight(), 1, "first request should be holding the slot");

    let queued = tokio::spawn({
        let endpoint = client.endpoint("entity/product");
        async move { endpoint.request::<Value>("").get().await }
    });
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    stuck.abort();
    let _ = stuck.await;

    let released_at = Instant::now();
    let outcome = tokio::time::timeout(Duration::from_secs(5), queued)
        .await
        .expect("queued request should not wait out the cancelled call")
        .expect("task completed");
    outcome.expect("queued request succeeded");
    assert!(
        released_at.elapsed() < Duration::from_millis(100),
        "queued request should proceed immediately after cancellation"
    );
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn derived_clients_share_one_admission_budget() {
    let authorizations = Arc::new(Mutex::new(Vec::<String>::new()));
    let observed = Arc::clone(&authorizations);
    let client = client_over(admission(1000.0, 1000, 1), move |request: ApiRequest| {
        let observed = Arc::clone(&observed);
        async move {
            if let Some(auth) = request.headers.get(header::AUTHORIZATION) {
                observed
                    .lock()
                    .expect("lock")
                    .push(auth.to_str().unwrap_or("<opaque>").to_string());
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(json_response(200, json!({"ok": true})))
        }
    });
    let derived = client
        .with_credential(Credential::Bearer("second-account-user".into()))
        .expect("derived client");

    let started = Instant::now();
    let first = tokio::spawn({
        let endpoint = client.endpoint("entity/product");
        async move {
            endpoint.request::<Value>("").get().await.expect("ok");
            Instant::now()
        }
    });
    let second = tokio::spawn({
        let endpoint = derived.endpoint("entity/product");
        async move {
            endpoint.request::<Value>("").get().await.expect("ok");
            Instant::now()
        }
    });

    let mut offsets = vec![
        first.await.expect("task") - started,
        second.await.expect("task") - started,
    ];
    offsets.sort();
    assert!(offsets[0] >= Duration::from_secs(1));
    assert!(
        offsets[1] >= Duration::from_secs(2),
        "derived client must queue behind the shared slot, completed at {:?}",
        offsets[1]
    );

    let seen = authorizations.lock().expect("lock");
    assert!(seen.contains(&"Bearer test-token".to_string()));
    assert!(seen.contains(&"Bearer second-account-user".to_string()));
}

#[tokio::test]
async fn deferred_requests_return_a_pollable_handle() {
    let client = client_over(admission(1000.0, 1000, 5), |request: ApiRequest| async move {
        if request.url.contains("async=true") {
            let mut response = empty_response(202);
            response.headers_mut().insert(
                header::LOCATION,
                HeaderValue::from_static("https://api.stockbook.test/api/v2/async/42"),
            );
            Ok(response)
        } else if request.url.ends_with("/async/42") {
            Ok(json_response(
                200,
                json!({
                    "id": "42",
                    "state": "DONE",
                    "resultUrl": "https://api.stockbook.test/api/v2/async/42/result"
                }),
            ))
        } else if request.url.ends_with("/async/42/result") {
            Ok(json_response(200, json!({"name": "Bolt M4"})))
        } else {
            Ok(json_response(404, json!({"errors": [{"message": "unexpected url"}]})))
        }
    });

    let task = client
        .endpoint("entity/product")
        .request::<Value>("")
        .json_body(&json!({"name": "Bolt M4"}))
        .expect("body encodes")
        .post_deferred()
        .await
        .expect("deferred dispatch accepted");
    assert_eq!(task.status_url(), "https://api.stockbook.test/api/v2/async/42");

    let status = task.status().await.expect("status fetch");
    assert_eq!(status.id, "42");

    let result: Value = task.result().await.expect("result fetch");
    assert_eq!(result["name"], "Bolt M4");
}

#[tokio::test]
async fn query_parameters_reach_the_wire_in_structured_form() {
    let seen_url = Arc::new(Mutex::new(String::new()));
    let captured = Arc::clone(&seen_url);
    let client = client_over(admission(1000.0, 1000, 5), move |request: ApiRequest| {
        let captured = Arc::clone(&captured);
        async move {
            *captured.lock().expect("lock") = request.url.clone();
            Ok(json_response(200, json!({"rows": [], "meta": {"size": 0, "limit": 2, "offset": 0}})))
        }
    });

    use stockbook_api::params::{Direction, FilterOp};
    let params = stockbook_api::QueryParams::new()
        .limit(2)
        .order_by("name", Direction::Asc)
        .filter("archived", FilterOp::Eq, "false")
        .expand("owner");
    client
        .endpoint("entity/product")
        .request::<Value>("")
        .query(&params)
        .get()
        .await
        .expect("list fetched");

    let url = seen_url.lock().expect("lock").clone();
    assert!(url.starts_with("https://api.stockbook.test/api/v2/entity/product?"));
    assert!(url.contains("limit=2"));
    assert!(url.contains("order=name%2Casc"));
    assert!(url.contains("filter=archived%3Dfalse"));
    assert!(url.contains("expand=owner"));
}
