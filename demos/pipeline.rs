//! Walks through the request pipeline against a local mock backend.
//!
//! 1. Point a [`PipelineConfig`] at the backend and build an [`ApiClient`] with a bearer token
//!    supplied by a [`StaticTokenSource`].
//! 2. Preload the CSRF token with [`ApiClient::warm_csrf`].
//! 3. Issue a GET (no CSRF involvement) and a POST (CSRF header attached).
//! 4. Sign out and observe the normalized `401` surfaced to the caller.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use guarded_request::{
	auth::StaticTokenSource,
	client::{ApiClient, RequestOptions},
	config::PipelineConfig,
	serde_json::json,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/csrf-token").header("authorization", "Bearer demo-token");
			then.status(200).json_body(json!({ "csrf_token": "demo-csrf" }));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/accounts").header("authorization", "Bearer demo-token");
			then.status(200).json_body(json!([{ "id": "acc-1", "balance": 1200 }]));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/api/transfers").header("x-csrf-token", "demo-csrf");
			then.status(201).json_body(json!({ "id": "tr-1", "status": "pending" }));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/accounts").header_missing("authorization");
			then.status(401).json_body(json!({ "message": "Login required", "code": "unauthenticated" }));
		})
		.await;

	let config = PipelineConfig::builder(Url::parse(&server.base_url())?).build()?;
	let tokens = Arc::new(StaticTokenSource::new(Some("demo-token")));
	let client = ApiClient::new(config, tokens.clone())?;

	client.warm_csrf().await;

	let accounts = client.get("/api/accounts").await?;

	println!("Accounts: {accounts}.");

	let transfer = client
		.request(
			"/api/transfers",
			RequestOptions::post().with_body(json!({ "from": "acc-1", "amount": 50 })),
		)
		.await?;

	println!("Transfer created: {transfer}.");

	tokens.clear();
	client.invalidate_csrf();

	match client.get("/api/accounts").await {
		Ok(value) => println!("Unexpected success after sign-out: {value}."),
		Err(err) => println!(
			"Signed-out call failed with kind={} status={:?} code={:?}: {}.",
			err.kind, err.status, err.code, err.message
		),
	}

	let metrics = client.metrics();

	println!(
		"Dispatches={} csrf_fetches={} successes={} failures={}.",
		metrics.dispatches(),
		metrics.csrf_fetches(),
		metrics.successes(),
		metrics.failures()
	);

	Ok(())
}
