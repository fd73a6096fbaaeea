//! Shared constants for end-to-end tests
//!
//! When test data changes (user credentials, timeouts), update only this
//! file.

/// Regular test user handle
pub const TEST_USER: &str = "testuser";

/// Regular test user password
pub const TEST_PASS: &str = "testpass123";

/// Second user, for ownership isolation tests
pub const OTHER_USER: &str = "otheruser";

/// Second user's password
pub const OTHER_PASS: &str = "otherpass123";

/// How long to wait for the spawned server to answer on /
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Polling interval while waiting for readiness
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

/// Per-request timeout for the test HTTP client
pub const REQUEST_TIMEOUT_SECS: u64 = 10;
