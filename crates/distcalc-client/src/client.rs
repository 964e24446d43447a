use std::time::Duration;

use distcalc_common::auth::API_KEY_HEADER;
use distcalc_common::protocol::{ResultReport, SubmitTask, SubtaskPayload, TaskId, TaskView};
use distcalc_common::{DistcalcError, Result};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout
    ///
    /// Default: 30 seconds
    pub timeout: Duration,
    /// Sent as `X-API-Key` on public endpoints when set
    pub api_key: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            api_key: None,
        }
    }
}

/// Distcalc client for the orchestrator HTTP API.
///
/// Covers both sides of the API: the public calculator endpoints used by
/// callers and the `/internal/task` endpoints used by workers. Non-success
/// responses are mapped back to [`DistcalcError`] variants:
///
/// | status | error |
/// |---|---|
/// | 401 | `Unauthorized` |
/// | 404 | `NotFound` |
/// | 409 | `Conflict` |
/// | 422 | `NotAnExpression` or `Protocol` |
/// | 400 | `Protocol` |
/// | 5xx | `Storage` |
#[derive(Clone)]
pub struct CalcClient {
    base_url: String,
    client: Client<HttpConnector, Full<Bytes>>,
    config: ClientConfig,
}

impl CalcClient {
    /// Creates a client for the orchestrator at `base_url`.
    ///
    /// # Arguments
    /// * `base_url` - e.g. `http://127.0.0.1:8080`; a trailing `/` is ignored
    ///
    /// # Errors
    /// [`DistcalcError::Protocol`] if the URL does not start with `http://`.
    /// The connector is plain HTTP, so `https://` URLs are rejected here
    /// instead of failing on every request.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_config(base_url, ClientConfig::default())
    }

    pub fn with_config(base_url: impl Into<String>, config: ClientConfig) -> Result<Self> {
        let base_url = base_url.into();
        if base_url.starts_with("https://") {
            return Err(DistcalcError::Protocol(format!(
                "TLS is not supported, use an http:// orchestrator URL instead of '{}'",
                base_url
            )));
        }
        if !base_url.starts_with("http://") {
            return Err(DistcalcError::Protocol(format!(
                "orchestrator URL must start with http://, got '{}'",
                base_url
            )));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder(TokioExecutor::new()).build_http(),
            config,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submits an expression under the caller-chosen `id`.
    pub async fn submit(&self, id: TaskId, expression: impl Into<String>) -> Result<()> {
        let body = SubmitTask::new(id, expression);
        let (status, bytes) = self
            .send(Method::POST, "/api/v1/calculate", Some(&body))
            .await?;

        match status {
            StatusCode::CREATED | StatusCode::OK => Ok(()),
            StatusCode::CONFLICT => Err(DistcalcError::Conflict(id)),
            _ => Err(error_for_status(status, &bytes)),
        }
    }

    /// Fetches one task.
    pub async fn task(&self, id: TaskId) -> Result<TaskView> {
        let path = format!("/api/v1/expressions/{}", id);
        let (status, bytes) = self.send::<()>(Method::GET, &path, None).await?;
        expect_json(status, &bytes)
    }

    /// Lists all tasks visible to this client.
    pub async fn tasks(&self) -> Result<Vec<TaskView>> {
        let (status, bytes) = self
            .send::<()>(Method::GET, "/api/v1/expressions", None)
            .await?;
        expect_json(status, &bytes)
    }

    /// Takes a subtask, or `None` when the orchestrator has no work.
    pub async fn request_subtask(&self) -> Result<Option<SubtaskPayload>> {
        let (status, bytes) = self.send::<()>(Method::GET, "/internal/task", None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        expect_json(status, &bytes).map(Some)
    }

    /// Reports a computed (or failed) subtask.
    pub async fn report(&self, report: &ResultReport) -> Result<()> {
        let (status, bytes) = self
            .send(Method::POST, "/internal/task", Some(report))
            .await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(error_for_status(status, &bytes))
        }
    }

    /// Checks that the orchestrator answers its health endpoint.
    pub async fn health(&self) -> Result<()> {
        let (status, bytes) = self.send::<()>(Method::GET, "/__health", None).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(error_for_status(status, &bytes))
        }
    }

    /// Sends one request and reads the whole response body.
    async fn send<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&T>,
    ) -> Result<(StatusCode, Bytes)> {
        let url = format!("{}{}", self.base_url, path);
        let payload = match body {
            Some(body) => serde_json::to_vec(body)?,
            None => Vec::new(),
        };

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(&url)
            .header("Content-Type", "application/json");
        if let Some(api_key) = &self.config.api_key {
            builder = builder.header(API_KEY_HEADER, api_key);
        }
        let request = builder
            .body(Full::new(Bytes::from(payload)))
            .map_err(|e| DistcalcError::Transport(format!("Failed to build request: {}", e)))?;

        let timeout = self.config.timeout;
        let response = tokio::time::timeout(timeout, self.client.request(request))
            .await
            .map_err(|_| DistcalcError::Timeout(timeout.as_millis() as u64))?
            .map_err(|e| DistcalcError::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| DistcalcError::Transport(format!("Failed to read response: {}", e)))?
            .to_bytes();

        debug!("{} {} -> {}", method, url, status);
        Ok((status, bytes))
    }
}

/// Decodes a 2xx JSON body, or maps the status to an error.
fn expect_json<T: DeserializeOwned>(status: StatusCode, bytes: &Bytes) -> Result<T> {
    if !status.is_success() {
        return Err(error_for_status(status, bytes));
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// Maps an error response to a [`DistcalcError`].
///
/// The server's `{"error": "..."}` message is carried over where the variant
/// holds one.
fn error_for_status(status: StatusCode, bytes: &Bytes) -> DistcalcError {
    let message = serde_json::from_slice::<serde_json::Value>(bytes)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned());

    match status {
        StatusCode::UNAUTHORIZED => DistcalcError::Unauthorized,
        StatusCode::NOT_FOUND => DistcalcError::NotFound(message),
        StatusCode::UNPROCESSABLE_ENTITY if message.starts_with("Not an expression") => {
            DistcalcError::NotAnExpression
        }
        StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST | StatusCode::CONFLICT => {
            DistcalcError::Protocol(message)
        }
        s if s.is_server_error() => DistcalcError::Storage(message),
        s => DistcalcError::Transport(format!("unexpected status {}: {}", s, message)),
    }
}
