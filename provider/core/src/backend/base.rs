//! Base HTTP client shared by both protocol clients

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::factory::ProviderKind;
use super::traits::AVAILABILITY_TIMEOUT;
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::registry::{RequestGuard, RequestId, RequestRegistry};
use crate::transport::{check_status, read_json, RetryingTransport};

/// Endpoint, transport and registry of one client instance
#[derive(Clone, Debug)]
pub(crate) struct ClientBase {
    kind: ProviderKind,
    base_url: String,
    transport: RetryingTransport,
    registry: RequestRegistry,
}

impl ClientBase {
    pub(crate) fn new(kind: ProviderKind, config: &ProviderConfig) -> Self {
        Self {
            kind,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            transport: RetryingTransport::new(kind.label(), config.timeout, config.retry.clone()),
            registry: RequestRegistry::new(),
        }
    }

    pub(crate) fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.transport.timeout()
    }

    pub(crate) fn set_timeout(&mut self, timeout: Duration) {
        self.transport.set_timeout(timeout);
    }

    pub(crate) fn max_retries(&self) -> u32 {
        self.transport.policy().max_attempts
    }

    pub(crate) fn set_max_retries(&mut self, max_retries: u32) {
        let mut policy = self.transport.policy().clone();
        policy.max_attempts = max_retries;
        self.transport.set_policy(policy);
    }

    pub(crate) fn transport(&self) -> &RetryingTransport {
        &self.transport
    }

    pub(crate) fn registry(&self) -> &RequestRegistry {
        &self.registry
    }

    /// Build URL from base URL and path
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) fn register(&self, id: Option<RequestId>) -> Result<RequestGuard> {
        self.registry.register(id)
    }

    /// GET a JSON document as a registered, retried call
    ///
    /// Used for listings, so a 404 means the endpoint is missing rather than
    /// a model.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let guard = self.register(None)?;
        let url = self.url(path);

        let response = self
            .transport
            .send(guard.token(), |http| http.get(&url))
            .await?;
        let response = check_status(response, None, guard.token(), self.timeout()).await?;
        read_json(response, guard.token(), self.timeout()).await
    }

    /// POST a JSON body and decode the JSON answer as a registered, retried call
    pub(crate) async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        subject: &str,
        id: Option<RequestId>,
    ) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let guard = self.register(id)?;
        let url = self.url(path);

        let response = self
            .transport
            .send(guard.token(), |http| http.post(&url).json(body))
            .await?;
        let response =
            check_status(response, Some(subject), guard.token(), self.timeout()).await?;
        read_json(response, guard.token(), self.timeout()).await
    }

    /// Single short GET, no retry; `true` on any success status
    pub(crate) async fn probe(&self, path: &str) -> bool {
        let url = self.url(path);
        match self
            .transport
            .http()
            .get(&url)
            .timeout(AVAILABILITY_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(backend = self.kind.label(), url = %url, error = %e, "Probe failed");
                false
            }
        }
    }

    /// Single short GET decoded as JSON, no retry; `None` on any failure
    pub(crate) async fn probe_json<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        let url = self.url(path);
        let response = self
            .transport
            .http()
            .get(&url)
            .timeout(AVAILABILITY_TIMEOUT)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json().await.ok()
    }
}
