//! HTTP adapter for a scenario server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;

use super::{
    CreateReceipt, DeleteAck, Envelope, PersistedScenario, RemoteSyncAdapter, ScenarioList,
    ScenarioPayload, UpdateReceipt,
};
use crate::defaults::DefaultsProvider;
use crate::error::ScenarioError;
use crate::node::Node;
use crate::simulation::{SimulationRequest, SimulationResponse, SimulationService};

/// Talks to a scenario server speaking the envelope protocol.
///
/// Every endpoint answers with an [`Envelope`] body. Transport errors and
/// bodies that are not envelopes become failure envelopes carrying the HTTP
/// status when one was received.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    server_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpRemote {
    pub fn new(server_url: String, api_key: Option<String>) -> Self {
        Self {
            server_url,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Uses a client with a request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ScenarioError> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScenarioError::RemoteFailure {
                status: None,
                message: e.to_string(),
            })?;
        Ok(self)
    }

    /// Returns the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Returns the API key.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Envelope<T> {
        let response = match self.authorize(request).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "scenario server unreachable");
                return Envelope::failure(e.status().map(|s| s.as_u16()), e.to_string());
            }
        };

        let status = response.status();
        let mut envelope: Envelope<T> = match response.json().await {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(%status, error = %e, "unexpected response body");
                return Envelope::failure(
                    Some(status.as_u16()),
                    format!("Server returned status {}", status),
                );
            }
        };

        if envelope.status_code.is_none() {
            envelope.status_code = Some(status.as_u16());
        }
        if envelope.success && !status.is_success() {
            envelope.success = false;
            envelope.data = None;
            envelope
                .error
                .get_or_insert_with(|| format!("Server returned status {}", status));
        }
        if !envelope.success {
            tracing::warn!(%status, error = ?envelope.error, "scenario server reported failure");
        }
        envelope
    }

    fn build_http_url(&self, path: &str) -> String {
        let base_url = if !self.server_url.starts_with("http://")
            && !self.server_url.starts_with("https://")
        {
            format!("http://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!("{}{}", base_url.trim_end_matches('/'), path)
    }

    fn list_url(&self, page: u32, page_size: u32, filter: Option<&str>) -> Result<Url, String> {
        let mut params = vec![
            ("page", page.to_string()),
            ("pageSize", page_size.to_string()),
        ];
        if let Some(filter) = filter {
            params.push(("filter", filter.to_string()));
        }
        Url::parse_with_params(&self.build_http_url("/scenarios"), &params)
            .map_err(|e| e.to_string())
    }

    /// URL of `collection/key` with `key` percent-encoded as one segment.
    fn resource_url(&self, collection: &str, key: &str) -> Result<Url, String> {
        let mut url = Url::parse(&self.build_http_url(collection)).map_err(|e| e.to_string())?;
        url.path_segments_mut()
            .map_err(|_| format!("Invalid server URL: {}", self.server_url))?
            .push(key);
        Ok(url)
    }
}

#[async_trait(?Send)]
impl RemoteSyncAdapter for HttpRemote {
    async fn list(
        &self,
        page: u32,
        page_size: u32,
        filter: Option<&str>,
    ) -> Envelope<ScenarioList> {
        match self.list_url(page, page_size, filter) {
            Ok(url) => self.send(self.client.get(url)).await,
            Err(e) => Envelope::failure(None, e),
        }
    }

    async fn get(&self, id: &str) -> Envelope<PersistedScenario> {
        match self.resource_url("/scenarios", id) {
            Ok(url) => self.send(self.client.get(url)).await,
            Err(e) => Envelope::failure(None, e),
        }
    }

    async fn create(&self, payload: &ScenarioPayload) -> Envelope<CreateReceipt> {
        let url = self.build_http_url("/scenarios");
        self.send(self.client.post(url).json(payload)).await
    }

    async fn update(&self, id: &str, payload: &ScenarioPayload) -> Envelope<UpdateReceipt> {
        match self.resource_url("/scenarios", id) {
            Ok(url) => self.send(self.client.put(url).json(payload)).await,
            Err(e) => Envelope::failure(None, e),
        }
    }

    async fn delete(&self, id: &str) -> Envelope<DeleteAck> {
        match self.resource_url("/scenarios", id) {
            Ok(url) => self.send(self.client.delete(url)).await,
            Err(e) => Envelope::failure(None, e),
        }
    }
}

#[async_trait(?Send)]
impl DefaultsProvider for HttpRemote {
    async fn get_defaults(&self, variant: &str) -> Envelope<Node> {
        match self.resource_url("/defaults", variant) {
            Ok(url) => self.send(self.client.get(url)).await,
            Err(e) => Envelope::failure(None, e),
        }
    }
}

#[async_trait(?Send)]
impl SimulationService for HttpRemote {
    async fn simulate(&self, request: &SimulationRequest) -> Envelope<SimulationResponse> {
        let url = self.build_http_url("/simulations");
        self.send(self.client.post(url).json(request)).await
    }
}
