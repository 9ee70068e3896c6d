//! One-shot snapshot calls over HTTP.
//!
//! Each call is a single attempt; retry policy belongs to the caller.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderValue};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    Config, DagsyncError, Result,
    config::EndpointConfig,
    model::WorkflowModel,
    workflow::WorkflowGraph,
};

/// Source of full snapshots.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetches the full workflow graph of `session_id`.
    async fn fetch_workflow(
        &self,
        session_id: &str,
    ) -> Result<WorkflowGraph>;

    /// Fetches the latest run log transcript.
    async fn fetch_logs(&self) -> Result<String>;

    /// Fetches the pending human-in-the-loop requests.
    async fn fetch_hitl_pending(&self) -> Result<Vec<Value>>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    endpoints: EndpointConfig,
}

impl HttpFetcher {
    pub fn new(
        endpoints: EndpointConfig,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| DagsyncError::Config(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            endpoints,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.endpoints.clone(), config.timeouts.fetch())
    }

    /// Asks the backend to run a simulated workflow for `session_id`.
    pub async fn trigger_simulation(
        &self,
        session_id: &str,
    ) -> Result<()> {
        self.post(&self.endpoints.simulate_url(session_id)).await
    }

    /// Approves a pending human-in-the-loop request.
    pub async fn approve_hitl(
        &self,
        request_id: &str,
    ) -> Result<()> {
        self.post(&self.endpoints.hitl_approve_url(request_id)).await
    }

    /// Denies a pending human-in-the-loop request.
    pub async fn deny_hitl(
        &self,
        request_id: &str,
    ) -> Result<()> {
        self.post(&self.endpoints.hitl_deny_url(request_id)).await
    }

    /// Asks the backend to retry a task that hit a dead end.
    pub async fn retry_dead_end(
        &self,
        task_id: &str,
    ) -> Result<()> {
        self.post(&self.endpoints.dead_end_retry_url(task_id)).await
    }

    /// Succeeds when the backend answers its health check with a 2xx.
    pub async fn health(&self) -> Result<()> {
        self.get_text(&self.endpoints.health_url(), "*/*").await?;
        Ok(())
    }

    async fn post(
        &self,
        url: &str,
    ) -> Result<()> {
        debug!(url, "posting");
        let response = self.client.post(url).send().await.map_err(|e| transport_error(url, e))?;
        check_status(response).await?;
        Ok(())
    }

    async fn get_text(
        &self,
        url: &str,
        accept: &'static str,
    ) -> Result<(u16, String)> {
        debug!(url, "fetching");
        let response = self.client.get(url).header(ACCEPT, HeaderValue::from_static(accept)).send().await.map_err(|e| transport_error(url, e))?;
        check_status(response).await
    }
}

#[async_trait]
impl SnapshotSource for HttpFetcher {
    async fn fetch_workflow(
        &self,
        session_id: &str,
    ) -> Result<WorkflowGraph> {
        let (status, body) = self.get_text(&self.endpoints.workflow_url(session_id), "application/json").await?;

        let model = WorkflowModel::from_json(&body).map_err(|e| DagsyncError::fetch(Some(status), e.to_string()))?;
        let (graph, dropped) = WorkflowGraph::from_model(model).map_err(|e| DagsyncError::fetch(Some(status), e.to_string()))?;
        for edge in dropped {
            warn!(edge = %edge.id, "dropping snapshot edge: {}", edge.error);
        }

        Ok(graph)
    }

    async fn fetch_logs(&self) -> Result<String> {
        let (_, body) = self.get_text(&self.endpoints.logs_url(), "text/plain").await?;
        Ok(body)
    }

    async fn fetch_hitl_pending(&self) -> Result<Vec<Value>> {
        let (status, body) = self.get_text(&self.endpoints.hitl_pending_url(), "application/json").await?;
        serde_json::from_str::<Vec<Value>>(&body).map_err(|e| DagsyncError::fetch(Some(status), format!("invalid pending hitl list: {}", e)))
    }
}

fn transport_error(
    url: &str,
    error: reqwest::Error,
) -> DagsyncError {
    DagsyncError::fetch(None, format!("request to {} failed: {}", url, error))
}

async fn check_status(response: reqwest::Response) -> Result<(u16, String)> {
    let status = response.status();
    let body = response.text().await.map_err(|e| DagsyncError::fetch(Some(status.as_u16()), e.to_string()))?;

    if !status.is_success() {
        let message = if body.is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            body
        };
        return Err(DagsyncError::fetch(Some(status.as_u16()), message));
    }

    Ok((status.as_u16(), body))
}
