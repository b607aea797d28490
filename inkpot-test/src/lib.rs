// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of inkpot.
//
// inkpot is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// inkpot is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with inkpot.  If not,
// see <http://www.gnu.org/licenses/>.

//! # The inkpot Integration Tests
//!
//! The stock test harness knows nothing of fixtures, so each integration test program in `tests/`
//! opts out of it (`harness = false` in Cargo.toml), sets up its own fixture (a running inkpot
//! instance) & hands a list of trials to [libtest-mimic], which takes care of argument parsing,
//! filtering & reporting.
//!
//! [libtest-mimic]: https://docs.rs/libtest-mimic/latest/libtest_mimic/index.html
//!
//! Test logic that doesn't care how inkpot is deployed lives in this library; each function takes
//! the base URL of an inkpot instance. Code relating to the test framework itself (the `Test`
//! struct, e.g.) belongs in `tests/common`. Since every trial in a program runs against the same
//! instance (& in parallel, by default), each one works with its own users.
use libtest_mimic::Failed;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;

use inkpot_shared::api::{LoginRsp, SignupRsp};

pub mod blogs;
pub mod discovery;
pub mod users;

/// Password given to every user the integration tests create
pub const PASSWORD: &str = "f00 b@r sp1at";

/// The body of any non-2xx response
#[derive(Clone, Debug, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Hit the healthcheck endpoint; fail on anything other than success
pub async fn test_healthcheck(url: Url) -> Result<(), Failed> {
    assert_eq!(
        "GOOD",
        reqwest::get(url.join("/healthcheck")?).await?.text().await?
    );
    Ok(())
}

/// Check that the Prometheus exposition is up & counting requests
pub async fn test_metrics(url: Url) -> Result<(), Failed> {
    reqwest::get(url.join("/healthcheck")?).await?;
    let rsp = reqwest::get(url.join("/metrics")?).await?;
    assert_eq!(StatusCode::OK, rsp.status());
    let text = rsp.text().await?;
    assert!(text.contains("inkpot_http_requests_total"));
    assert!(text.contains("/healthcheck"));
    Ok(())
}

/// Sign up `username`, with [PASSWORD]
pub async fn signup(client: &Client, url: &Url, username: &str) -> Result<(), Failed> {
    let rsp = client
        .post(url.join("/api/v1/users/signup")?)
        .json(&json!({
            "username": username,
            "password": PASSWORD,
            "email": format!("{}@example.com", username),
        }))
        .send()
        .await?;
    assert_eq!(StatusCode::CREATED, rsp.status());
    let body = rsp.json::<SignupRsp>().await?;
    assert_eq!(format!("Welcome to inkpot, {}!", username), body.greeting);
    Ok(())
}

/// Log `username` in; return a value suitable for the Authorization header
pub async fn login(client: &Client, url: &Url, username: &str) -> Result<String, Failed> {
    let rsp = client
        .post(url.join("/api/v1/users/login")?)
        .json(&json!({"username": username, "password": PASSWORD}))
        .send()
        .await?;
    assert_eq!(StatusCode::OK, rsp.status());
    Ok(format!("Bearer {}", rsp.json::<LoginRsp>().await?.token))
}

/// Sign `username` up & log them in
pub async fn new_user(client: &Client, url: &Url, username: &str) -> Result<String, Failed> {
    signup(client, url, username).await?;
    login(client, url, username).await
}

/// Convenience for attaching credentials
pub fn with_auth(builder: RequestBuilder, auth: &str) -> RequestBuilder {
    builder.header(reqwest::header::AUTHORIZATION, auth)
}
