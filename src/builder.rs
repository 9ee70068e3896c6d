use std::sync::Arc;

use crate::{
    Config, Result, WorkflowSession,
    fetcher::{HttpFetcher, SnapshotSource},
};

pub struct SessionBuilder {
    config: Config,
    source: Option<Arc<dyn SnapshotSource>>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            source: None,
        }
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn session_id(
        mut self,
        session_id: impl Into<String>,
    ) -> Self {
        self.config.session_id = session_id.into();
        self
    }

    pub fn http_base_url(
        mut self,
        url: impl Into<String>,
    ) -> Self {
        self.config.endpoints.http_base_url = url.into();
        self
    }

    pub fn ws_url(
        mut self,
        url: impl Into<String>,
    ) -> Self {
        self.config.endpoints.ws_url = url.into();
        self
    }

    /// Overrides the snapshot source; defaults to an `HttpFetcher` on the configured endpoints.
    pub fn source(
        mut self,
        source: Arc<dyn SnapshotSource>,
    ) -> Self {
        self.source = Some(source);
        self
    }

    pub fn build(&self) -> Result<WorkflowSession> {
        let source = match self.source.as_ref() {
            Some(source) => source.clone(),
            None => Arc::new(HttpFetcher::from_config(&self.config)?),
        };

        Ok(WorkflowSession::new(self.config.clone(), source))
    }
}
