//! HTTP client for end-to-end tests
//!
//! Wraps reqwest and provides methods for every server endpoint. When API
//! routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::json;
use std::time::Duration;

/// HTTP test client with cookie-based session management
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    /// Session token from the last successful login
    pub token: Option<String>,
}

impl TestClient {
    /// Creates a new unauthenticated client.
    ///
    /// Use this for testing authentication flows; for most tests use
    /// `authenticated()`.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .cookie_store(true) // Automatically handle session cookies
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            token: None,
        }
    }

    /// Creates a client pre-authenticated as the regular test user.
    ///
    /// # Panics
    ///
    /// Panics if authentication fails (indicates test infrastructure
    /// problem).
    pub async fn authenticated(base_url: String) -> Self {
        Self::authenticated_as(base_url, TEST_USER, TEST_PASS).await
    }

    /// Creates a client pre-authenticated as an arbitrary user.
    pub async fn authenticated_as(base_url: String, handle: &str, password: &str) -> Self {
        let mut client = Self::new(base_url);

        let response = client.login(handle, password).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::CREATED,
            "Authentication as {} failed",
            handle
        );

        let body: serde_json::Value = response.json().await.expect("Login body was not JSON");
        client.token = Some(
            body["token"]
                .as_str()
                .expect("Login body had no token")
                .to_string(),
        );

        client
    }

    /// The session token of an authenticated client.
    ///
    /// # Panics
    ///
    /// Panics if the client never logged in.
    pub fn session_token(&self) -> &str {
        self.token.as_deref().expect("Client is not authenticated")
    }

    // ========================================================================
    // Authentication Endpoints
    // ========================================================================

    /// POST /v1/auth/login
    pub async fn login(&self, handle: &str, password: &str) -> Response {
        self.client
            .post(format!("{}/v1/auth/login", self.base_url))
            .json(&json!({
                "user_handle": handle,
                "password": password,
            }))
            .send()
            .await
            .expect("Login request failed")
    }

    /// GET /v1/auth/logout
    pub async fn logout(&self) -> Response {
        self.client
            .get(format!("{}/v1/auth/logout", self.base_url))
            .send()
            .await
            .expect("Logout request failed")
    }

    /// GET /
    pub async fn home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("Home request failed")
    }

    // ========================================================================
    // Notification Endpoints
    // ========================================================================

    /// POST /v1/notifications
    pub async fn create_notification(&self, body: serde_json::Value) -> Response {
        self.client
            .post(format!("{}/v1/notifications", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Create notification request failed")
    }

    /// GET /v1/notifications?page=&limit=
    pub async fn list_notifications(&self, page: usize, limit: usize) -> Response {
        self.client
            .get(format!(
                "{}/v1/notifications?page={}&limit={}",
                self.base_url, page, limit
            ))
            .send()
            .await
            .expect("List notifications request failed")
    }

    /// GET /v1/notifications/{id}
    pub async fn get_notification(&self, id: &str) -> Response {
        self.client
            .get(format!("{}/v1/notifications/{}", self.base_url, id))
            .send()
            .await
            .expect("Get notification request failed")
    }

    /// PUT /v1/notifications/{id}
    pub async fn update_notification(&self, id: &str, body: serde_json::Value) -> Response {
        self.client
            .put(format!("{}/v1/notifications/{}", self.base_url, id))
            .json(&body)
            .send()
            .await
            .expect("Update notification request failed")
    }

    /// POST /v1/notifications/{id}/read
    pub async fn read_notification(&self, id: &str) -> Response {
        self.client
            .post(format!("{}/v1/notifications/{}/read", self.base_url, id))
            .send()
            .await
            .expect("Read notification request failed")
    }

    /// POST /v1/notifications/read_all
    pub async fn read_all_notifications(&self) -> Response {
        self.client
            .post(format!("{}/v1/notifications/read_all", self.base_url))
            .send()
            .await
            .expect("Read all request failed")
    }

    /// GET /v1/notifications/unread_count
    pub async fn unread_count(&self) -> Response {
        self.client
            .get(format!("{}/v1/notifications/unread_count", self.base_url))
            .send()
            .await
            .expect("Unread count request failed")
    }

    /// DELETE /v1/notifications/{id}
    pub async fn delete_notification(&self, id: &str) -> Response {
        self.client
            .delete(format!("{}/v1/notifications/{}", self.base_url, id))
            .send()
            .await
            .expect("Delete notification request failed")
    }

    /// DELETE /v1/notifications
    pub async fn delete_all_notifications(&self) -> Response {
        self.client
            .delete(format!("{}/v1/notifications", self.base_url))
            .send()
            .await
            .expect("Delete all request failed")
    }
}
