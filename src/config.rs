use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::{DagsyncError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// session whose workflow is mirrored
    pub session_id: String,
    /// backend endpoints
    pub endpoints: EndpointConfig,
    /// deadlines for connect, request and fetch
    pub timeouts: TimeoutConfig,
    /// reconnect backoff
    pub reconnect: ReconnectConfig,
    /// max lines kept in the log transcript, defaults to 5000
    pub max_log_lines: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// base url for one-shot http calls
    pub http_base_url: String,
    /// url of the persistent websocket connection
    pub ws_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// websocket open deadline in milliseconds
    pub connect_ms: u64,
    /// reply deadline in milliseconds
    pub request_ms: u64,
    /// http call deadline in milliseconds
    pub fetch_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_id: "default-session".to_string(),
            endpoints: EndpointConfig::default(),
            timeouts: TimeoutConfig::default(),
            reconnect: ReconnectConfig::default(),
            max_log_lines: 5000,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            http_base_url: "http://127.0.0.1:8000".to_string(),
            ws_url: "ws://127.0.0.1:8000/ws".to_string(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 5_000,
            request_ms: 10_000,
            fetch_ms: 10_000,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|e| DagsyncError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), e)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.timeouts.connect_ms == 0 || self.timeouts.request_ms == 0 || self.timeouts.fetch_ms == 0 {
            return Err(DagsyncError::Config("timeouts must be greater than zero".to_string()));
        }
        if self.reconnect.initial_backoff_ms > self.reconnect.max_backoff_ms {
            return Err(DagsyncError::Config("reconnect.initial_backoff_ms exceeds reconnect.max_backoff_ms".to_string()));
        }
        Ok(())
    }
}

impl EndpointConfig {
    fn base(&self) -> &str {
        self.http_base_url.trim_end_matches('/')
    }

    pub fn workflow_url(
        &self,
        session_id: &str,
    ) -> String {
        format!("{}/api/workflow/{}", self.base(), session_id)
    }

    pub fn simulate_url(
        &self,
        session_id: &str,
    ) -> String {
        format!("{}/api/workflow/{}/simulate", self.base(), session_id)
    }

    pub fn logs_url(&self) -> String {
        format!("{}/logs/latest", self.base())
    }

    pub fn hitl_pending_url(&self) -> String {
        format!("{}/api/hitl/pending", self.base())
    }

    pub fn hitl_approve_url(
        &self,
        request_id: &str,
    ) -> String {
        format!("{}/api/hitl/{}/approve", self.base(), request_id)
    }

    pub fn hitl_deny_url(
        &self,
        request_id: &str,
    ) -> String {
        format!("{}/api/hitl/{}/deny", self.base(), request_id)
    }

    pub fn dead_end_retry_url(
        &self,
        task_id: &str,
    ) -> String {
        format!("{}/api/dead-ends/{}/retry", self.base(), task_id)
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base())
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn fetch(&self) -> Duration {
        Duration::from_millis(self.fetch_ms)
    }
}

#[cfg(test)]
mod test {
    use crate::Config;

    #[test]
    fn test_config_deserialize() {
        let toml_str = r#"
        session_id = "s-42"
        max_log_lines = 100

        [endpoints]
        http_base_url = "http://localhost:9000/"
        ws_url = "ws://localhost:9000/ws"

        [timeouts]
        request_ms = 2500
        "#;
        let config = Config::load_from_str(toml_str).unwrap();
        assert_eq!(config.session_id, "s-42");
        assert_eq!(config.max_log_lines, 100);
        assert_eq!(config.timeouts.request_ms, 2500);
        assert_eq!(config.timeouts.connect_ms, 5_000);
        assert_eq!(config.reconnect.max_backoff_ms, 30_000);
        assert_eq!(config.endpoints.workflow_url("s-42"), "http://localhost:9000/api/workflow/s-42");
        assert_eq!(config.endpoints.logs_url(), "http://localhost:9000/logs/latest");
        assert_eq!(config.endpoints.hitl_pending_url(), "http://localhost:9000/api/hitl/pending");
        assert_eq!(config.endpoints.hitl_deny_url("r1"), "http://localhost:9000/api/hitl/r1/deny");
        assert_eq!(config.endpoints.dead_end_retry_url("t9"), "http://localhost:9000/api/dead-ends/t9/retry");
    }

    #[test]
    fn test_config_defaults_from_empty() {
        let config = Config::load_from_str("").unwrap();
        assert_eq!(config.session_id, "default-session");
        assert_eq!(config.endpoints.simulate_url("default-session"), "http://127.0.0.1:8000/api/workflow/default-session/simulate");
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        let toml_str = r#"
        [timeouts]
        request_ms = 0
        "#;
        assert!(Config::load_from_str(toml_str).is_err());
    }
}
