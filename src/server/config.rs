use super::RequestsLoggingLevel;

/// Runtime configuration for the notification server.
#[derive(Clone)]
pub struct ServerConfig {
    /// How much of each HTTP request to log.
    pub requests_logging_level: RequestsLoggingLevel,
    /// Port the API listens on. The metrics listener has its own port,
    /// passed separately to `run_server`.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::default(),
            port: 3001,
        }
    }
}
