// std
use std::{sync::Arc, time::Duration};
// crates.io
use httpmock::prelude::*;
use url::Url;
// self
use guarded_request::{
	auth::{StaticTokenSource, TokenSource},
	client::{ApiClient, RequestOptions},
	config::PipelineConfig,
	error::ErrorKind,
	serde_json::json,
};

fn build_client(server: &MockServer, bearer: Option<&str>) -> ApiClient {
	let config = PipelineConfig::builder(
		Url::parse(&server.base_url()).expect("Mock server base URL should parse successfully."),
	)
	.timeout(Duration::from_millis(300))
	.build()
	.expect("Pipeline config should build successfully.");
	let tokens: Arc<dyn TokenSource> = Arc::new(StaticTokenSource::new(bearer));

	ApiClient::new(config, tokens).expect("Reqwest-backed client should build successfully.")
}

#[tokio::test]
async fn cold_post_fetches_csrf_once_and_attaches_it() {
	let server = MockServer::start_async().await;
	let csrf = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/csrf-token").header("authorization", "Bearer user-1");
			then.status(200).json_body(json!({ "csrf_token": "csrf-abc" }));
		})
		.await;
	let create = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/items")
				.header("authorization", "Bearer user-1")
				.header("x-csrf-token", "csrf-abc")
				.header("content-type", "application/json")
				.json_body(json!({ "name": "desk" }));
			then.status(201).json_body(json!({ "id": 7 }));
		})
		.await;
	let client = build_client(&server, Some("user-1"));
	let first = client
		.post("/api/items", json!({ "name": "desk" }))
		.await
		.expect("First POST should succeed.");
	let second = client
		.post("/api/items", json!({ "name": "desk" }))
		.await
		.expect("Second POST should reuse the cached token.");

	assert_eq!(first, json!({ "id": 7 }));
	assert_eq!(second, json!({ "id": 7 }));

	csrf.assert_calls_async(1).await;
	create.assert_calls_async(2).await;
}

#[tokio::test]
async fn concurrent_mutations_share_one_token_fetch() {
	let server = MockServer::start_async().await;
	let csrf = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/csrf-token");
			then.status(200)
				.delay(Duration::from_millis(50))
				.json_body(json!({ "csrf_token": "shared" }));
		})
		.await;
	let update = server
		.mock_async(|when, then| {
			when.method(PUT).path("/api/profile").header("x-csrf-token", "shared");
			then.status(204);
		})
		.await;
	let client = build_client(&server, Some("user-2"));
	let options = RequestOptions::put().with_body(json!({ "theme": "dark" }));
	let (a, b, c) = tokio::join!(
		client.request("/api/profile", options.clone()),
		client.request("/api/profile", options.clone()),
		client.request("/api/profile", options),
	);

	for result in [a, b, c] {
		assert_eq!(result.expect("Concurrent PUT should succeed."), json!(null));
	}

	csrf.assert_calls_async(1).await;
	update.assert_calls_async(3).await;
}

#[tokio::test]
async fn reads_bypass_csrf_entirely() {
	let server = MockServer::start_async().await;
	let csrf = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/csrf-token");
			then.status(200).json_body(json!({ "csrf_token": "unused" }));
		})
		.await;
	let list = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/items").header_missing("x-csrf-token");
			then.status(200).json_body(json!([{ "id": 1 }]));
		})
		.await;
	let client = build_client(&server, Some("user-3"));
	let value = client.get("/api/items").await.expect("GET should succeed.");

	assert_eq!(value, json!([{ "id": 1 }]));

	csrf.assert_calls_async(0).await;
	list.assert_calls_async(1).await;
}

#[tokio::test]
async fn stale_token_is_refreshed_and_retried_once() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let mut stale_csrf = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/csrf-token");
			then.status(200).json_body(json!({ "csrf_token": "stale" }));
		})
		.await;
	let rejected = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/orders").header("x-csrf-token", "stale");
			then.status(403).json_body(json!({ "message": "CSRF token mismatch" }));
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/orders").header("x-csrf-token", "fresh");
			then.status(200).json_body(json!({ "order": "o-1" }));
		})
		.await;
	let client = build_client(&server, Some("user-4"));

	client.warm_csrf().await;
	stale_csrf.delete_async().await;

	let fresh_csrf = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/csrf-token");
			then.status(200).json_body(json!({ "csrf_token": "fresh" }));
		})
		.await;
	let value = client.post("/api/orders", json!({ "sku": "A-1" })).await?;

	assert_eq!(value, json!({ "order": "o-1" }));
	assert_eq!(client.metrics().csrf_retries(), 1);

	rejected.assert_calls_async(1).await;
	accepted.assert_calls_async(1).await;
	fresh_csrf.assert_calls_async(1).await;

	Ok(())
}

#[tokio::test]
async fn persistent_rejection_stops_after_two_attempts() {
	let server = MockServer::start_async().await;
	let csrf = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/csrf-token");
			then.status(200).json_body(json!({ "csrf_token": "whatever" }));
		})
		.await;
	let forbidden = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/api/orders/o-1");
			then.status(403).json_body(json!({ "error": { "message": "Forbidden", "code": "csrf" } }));
		})
		.await;
	let client = build_client(&server, Some("user-5"));
	let err = client
		.request("/api/orders/o-1", RequestOptions::delete())
		.await
		.expect_err("Repeated 403 should surface.");

	assert_eq!(err.kind, ErrorKind::CsrfRejected);
	assert_eq!(err.status, Some(403));
	assert_eq!(err.message, "Forbidden");
	assert_eq!(err.code.as_deref(), Some("csrf"));

	csrf.assert_calls_async(2).await;
	forbidden.assert_calls_async(2).await;
}

#[tokio::test]
async fn signed_out_read_surfaces_server_401() {
	let server = MockServer::start_async().await;
	let me = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/me").header_missing("authorization");
			then.status(401).json_body(json!({ "message": "Login required" }));
		})
		.await;
	let client = build_client(&server, None);
	let err = client.get("/api/me").await.expect_err("Signed-out GET should fail.");

	assert!(err.is_unauthorized());
	assert_eq!(err.kind, ErrorKind::Http);
	assert_eq!(err.message, "Login required");

	me.assert_calls_async(1).await;
}

#[tokio::test]
async fn token_endpoint_failure_never_reaches_protected_endpoint() {
	let server = MockServer::start_async().await;
	let csrf = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/csrf-token");
			then.status(500).body("Internal Server Error");
		})
		.await;
	let protected = server
		.mock_async(|when, then| {
			when.method(PATCH).path("/api/settings");
			then.status(200).json_body(json!({ "ok": true }));
		})
		.await;
	let client = build_client(&server, Some("user-6"));
	let err = client
		.request("/api/settings", RequestOptions::patch().with_body(json!({ "lang": "en" })))
		.await
		.expect_err("CSRF fetch failure should abort the call.");

	assert_eq!(err.kind, ErrorKind::CsrfFetchFailed);
	assert_eq!(err.status, Some(500));
	assert!(!client.csrf_cache().is_fetching());

	csrf.assert_calls_async(1).await;
	protected.assert_calls_async(0).await;
}

#[tokio::test]
async fn slow_responses_time_out_with_gateway_status() {
	let server = MockServer::start_async().await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/slow");
			then.status(200).delay(Duration::from_secs(2)).json_body(json!({ "late": true }));
		})
		.await;

	let client = build_client(&server, None);
	let err = client.get("/api/slow").await.expect_err("Slow GET should time out.");

	assert_eq!(err.kind, ErrorKind::Timeout);
	assert_eq!(err.status, Some(504));
}

#[tokio::test]
async fn malformed_success_bodies_are_reported() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/broken");
			then.status(200).header("content-type", "application/json").body("{\"items\": [1, ");
		})
		.await;

	let client = build_client(&server, None);
	let err = client.get("/api/broken").await.expect_err("Truncated JSON should fail.");

	assert_eq!(err.kind, ErrorKind::MalformedResponse);
	assert_eq!(err.status, Some(200));
}
