//! Management channel and its HTTP implementation.
//!
//! The [`ManagementClient`] trait is the only way the rest of the workspace talks to a
//! server: one request in, one result node out. [`HttpManagementClient`] implements it over
//! the HTTP management interface.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, ClientBuilder, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::config::ManagementConfig;
use crate::error::{Error, Result};
use crate::operation::{self, Attachment, Operation, OperationRequest, OUTCOME};

/// Default timeout for management requests in seconds.
pub const MANAGEMENT_DEFAULT_TIMEOUT: u64 = 60;

/// Default idle timeout for connection pools
pub const DEFAULT_POOL_IDLE_TIMEOUT: u64 = 90;

/// Default maximum idle connections per host
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 4;

/// Path of the JSON management endpoint.
pub const MANAGEMENT_PATH: &str = "management";

/// Path of the multipart upload endpoint.
pub const MANAGEMENT_UPLOAD_PATH: &str = "management-upload";

const USER_AGENT: &str = concat!("wildfly-core/", env!("CARGO_PKG_VERSION"));

/// HTTP client configuration.
///
/// Requests are never retried: a failed management operation is reported to the caller as is.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout
    pub timeout: Duration,

    /// Connection pool idle timeout
    pub pool_idle_timeout: Duration,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,

    /// Enable request/response logging
    pub enable_logging: bool,

    /// Enable response compression
    pub enable_compression: bool,
}

impl ClientConfig {
    /// Create a new client configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: Duration::from_secs(MANAGEMENT_DEFAULT_TIMEOUT),
            pool_idle_timeout: Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT),
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            enable_logging: true,
            enable_compression: true,
        }
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set connection pool idle timeout.
    #[must_use]
    pub const fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    /// Set maximum idle connections per host.
    #[must_use]
    pub const fn with_pool_max_idle(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Enable or disable logging.
    #[must_use]
    pub const fn with_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }

    /// Enable or disable compression.
    #[must_use]
    pub const fn with_compression(mut self, enabled: bool) -> Self {
        self.enable_compression = enabled;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A channel able to execute management operations.
///
/// Implementations return `Err` only when the request could not be delivered or the
/// response could not be read. An operation rejected by the server is returned as a result
/// node with a failed outcome.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManagementClient: Send + Sync {
    /// Execute a request and return the result node.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the request could not be executed.
    async fn execute(&self, request: OperationRequest) -> Result<Value>;
}

/// Execute a single operation and return its `result` payload.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] when the outcome is not successful, or the transport
/// error reported by the channel.
pub async fn execute_for_result(client: &dyn ManagementClient, op: Operation) -> Result<Value> {
    let body = op.to_json();
    let result = client.execute(op.into()).await?;
    if operation::is_success(&result) {
        Ok(operation::read_result(&result).clone())
    } else {
        Err(Error::operation_failed(&body, &result))
    }
}

/// Builder for [`HttpManagementClient`].
#[derive(Debug, Clone)]
pub struct HttpManagementClientBuilder {
    base_url: Url,
    http_config: ClientConfig,
    basic_auth: Option<(String, SecretString)>,
}

impl HttpManagementClientBuilder {
    /// Create a new builder for the management interface at `base_url`.
    ///
    /// The URL should include the protocol, host and port (e.g. `http://localhost:9990`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the URL cannot be parsed.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(base_url.as_ref()).map_err(|err| {
            Error::ConfigError(format!(
                "Invalid management URL `{}`: {err}",
                base_url.as_ref()
            ))
        })?;

        Ok(Self {
            base_url: url,
            http_config: ClientConfig::new(),
            basic_auth: None,
        })
    }

    /// Create a builder from a [`ManagementConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not form a valid URL.
    pub fn from_config(config: &ManagementConfig) -> Result<Self> {
        let mut builder = Self::new(config.management_url()?)?
            .with_http_config(ClientConfig::new().with_timeout(config.timeout()));
        if let Some(username) = &config.username {
            builder.basic_auth = Some((
                username.clone(),
                config
                    .password
                    .clone()
                    .unwrap_or_else(|| SecretString::from(String::new())),
            ));
        }
        Ok(builder)
    }

    /// Override the HTTP client configuration.
    #[must_use]
    pub fn with_http_config(mut self, config: ClientConfig) -> Self {
        self.http_config = config;
        self
    }

    /// Configure HTTP basic authentication.
    #[must_use]
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.basic_auth = Some((username.into(), SecretString::from(password.into())));
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the underlying HTTP client cannot be created.
    pub fn build(self) -> Result<HttpManagementClient> {
        let mut builder = ClientBuilder::new()
            .timeout(self.http_config.timeout)
            .user_agent(USER_AGENT)
            .pool_idle_timeout(self.http_config.pool_idle_timeout)
            .pool_max_idle_per_host(self.http_config.pool_max_idle_per_host)
            .connect_timeout(Duration::from_secs(10));

        if !self.http_config.enable_compression {
            builder = builder.no_gzip();
        }

        let http = builder.build().map_err(|err| {
            Error::ConfigError(format!("Failed to build management HTTP client: {err}"))
        })?;

        Ok(HttpManagementClient {
            http,
            base_url: self.base_url,
            basic_auth: self.basic_auth,
            enable_logging: self.http_config.enable_logging,
        })
    }
}

/// Management client speaking JSON over the HTTP management interface.
#[derive(Clone)]
pub struct HttpManagementClient {
    http: Client,
    base_url: Url,
    basic_auth: Option<(String, SecretString)>,
    enable_logging: bool,
}

impl HttpManagementClient {
    /// Create a new client for the given base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        HttpManagementClientBuilder::new(base_url)?.build()
    }

    /// Create a new client from a [`ManagementConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client cannot be built.
    pub fn from_config(config: &ManagementConfig) -> Result<Self> {
        HttpManagementClientBuilder::from_config(config)?.build()
    }

    /// Access the underlying base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn build_url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|err| {
            Error::InvalidEndpoint(format!("Invalid management path `{path}`: {err}"))
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.basic_auth {
            Some((user, pass)) => request.basic_auth(user, Some(pass.expose_secret())),
            None => request,
        }
    }

    async fn upload_form(request: &OperationRequest) -> Result<Form> {
        let operation = Part::text(request.body().to_string()).mime_str("application/json")?;
        let mut form = Form::new().part("operation", operation);

        for (index, attachment) in request.attachments().iter().enumerate() {
            let part = match attachment {
                Attachment::Bytes(bytes) => Part::stream(Body::from(bytes.clone())),
                Attachment::File(path) => {
                    let file = tokio::fs::File::open(path).await.map_err(|err| {
                        Error::Io(format!("Failed to open `{}`: {err}", path.display()))
                    })?;
                    let length = file.metadata().await?.len();
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| format!("attachment-{index}"));
                    Part::stream_with_length(Body::from(file), length).file_name(name)
                }
            };
            form = form.part(format!("input-stream-{index}"), part);
        }

        Ok(form)
    }
}

#[async_trait]
impl ManagementClient for HttpManagementClient {
    async fn execute(&self, request: OperationRequest) -> Result<Value> {
        if self.enable_logging {
            debug!(
                operation = request.operation_name(),
                attachments = request.attachments().len(),
                "management request"
            );
        }

        let builder = if request.attachments().is_empty() {
            self.http
                .post(self.build_url(MANAGEMENT_PATH)?)
                .header("Accept", "application/json")
                .json(request.body())
        } else {
            let form = Self::upload_form(&request).await?;
            self.http
                .post(self.build_url(MANAGEMENT_UPLOAD_PATH)?)
                .header("Accept", "application/json")
                .multipart(form)
        };

        let response = self.authorize(builder).send().await?;
        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        if status.is_success() || status == StatusCode::INTERNAL_SERVER_ERROR {
            match serde_json::from_str::<Value>(&text) {
                Ok(node) if node.get(OUTCOME).is_some() => {
                    if self.enable_logging && !operation::is_success(&node) {
                        info!(
                            operation = request.operation_name(),
                            "management operation failed"
                        );
                    }
                    return Ok(node);
                }
                Ok(_) | Err(_) if status.is_success() => {
                    return Err(Error::ParseError(format!(
                        "Management response for `{}` is not a result node: {text}",
                        request.operation_name()
                    )));
                }
                _ => {}
            }
        }

        Err(map_status_to_error(status, text))
    }
}

fn map_status_to_error(status: StatusCode, text: String) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::AuthenticationFailed(format!("Management authentication failed: {text}"))
        }
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            Error::ServiceUnavailable(format!("Management interface unavailable: {text}"))
        }
        status if status.is_server_error() => {
            Error::Transport(format!("Management server error {status}: {text}"))
        }
        _ => Error::HttpError(format!("Management error {status}: {text}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Address, CompositeBuilder};
    use bytes::Bytes;
    use serde_json::json;
    use std::io::Write;
    use wiremock::matchers::{body_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> HttpManagementClient {
        HttpManagementClient::new(server.uri()).unwrap()
    }

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new()
            .with_timeout(Duration::from_secs(5))
            .with_pool_idle_timeout(Duration::from_secs(120))
            .with_pool_max_idle(20)
            .with_logging(false)
            .with_compression(false);

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.pool_idle_timeout, Duration::from_secs(120));
        assert_eq!(config.pool_max_idle_per_host, 20);
        assert!(!config.enable_logging);
        assert!(!config.enable_compression);
    }

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(MANAGEMENT_DEFAULT_TIMEOUT));
        assert!(config.enable_logging);
    }

    #[test]
    fn test_builder_rejects_invalid_url() {
        let err = HttpManagementClientBuilder::new("not a url").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_builder_from_config() {
        let config = ManagementConfig::new("127.0.0.1", 19990)
            .unwrap()
            .with_credentials("admin", "admin");
        let client = HttpManagementClient::from_config(&config).unwrap();
        assert_eq!(client.base_url().as_str(), "http://127.0.0.1:19990/");
    }

    #[tokio::test]
    async fn execute_posts_json_operation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/management"))
            .and(body_json(json!({
                "operation": "read-attribute",
                "address": [],
                "name": "server-state"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"outcome": "success", "result": "running"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let op = Operation::read_attribute(Address::root(), "server-state");
        let result = client.execute(op.into()).await.unwrap();
        assert!(operation::is_success(&result));
        assert_eq!(operation::read_result(&result), &json!("running"));
    }

    #[tokio::test]
    async fn execute_returns_failed_outcome_from_500() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/management"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "outcome": "failed",
                "failure-description": "WFLYCTL0216: Management resource not found",
                "rolled-back": true
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let op = Operation::remove(Address::deployment("missing.war"));
        let result = client.execute(op.into()).await.unwrap();
        assert!(!operation::is_success(&result));
        assert!(operation::failure_description(&result).contains("WFLYCTL0216"));
    }

    #[tokio::test]
    async fn execute_maps_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/management"))
            .respond_with(ResponseTemplate::new(401).set_body_string("denied"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client
            .execute(Operation::root("whoami").into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed(_)));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn execute_rejects_non_result_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/management"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html/>"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client
            .execute(Operation::root("whoami").into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
    }

    #[tokio::test]
    async fn execute_sends_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/management"))
            .and(header_exists("authorization"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"outcome": "success"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpManagementClientBuilder::new(server.uri())
            .unwrap()
            .with_basic_auth("admin", "secret")
            .build()
            .unwrap();
        let result = client.execute(Operation::root("whoami").into()).await.unwrap();
        assert!(operation::is_success(&result));
    }

    #[tokio::test]
    async fn execute_uploads_attachments_as_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/management-upload"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"outcome": "success"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut archive = tempfile::NamedTempFile::new().unwrap();
        archive.write_all(b"PK archive").unwrap();

        let mut builder = CompositeBuilder::new();
        let first = builder.add_attachment(Attachment::Bytes(Bytes::from_static(b"in-memory")));
        let second = builder.add_attachment(Attachment::File(archive.path().to_path_buf()));
        builder.add_step(
            Operation::add(Address::deployment("a.war"))
                .with_param("content", json!([{ "input-stream-index": first }])),
        );
        builder.add_step(
            Operation::add(Address::deployment("b.war"))
                .with_param("content", json!([{ "input-stream-index": second }])),
        );

        let client = test_client(&server);
        let result = client.execute(builder.build()).await.unwrap();
        assert!(operation::is_success(&result));

        let received = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&received[0].body);
        assert!(body.contains("\"operation\":\"composite\""));
        assert!(body.contains("in-memory"));
        assert!(body.contains("PK archive"));
    }

    #[tokio::test]
    async fn execute_for_result_reads_payload() {
        let mut mock = MockManagementClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(json!({"outcome": "success", "result": "master"})));

        let value = execute_for_result(
            &mock,
            Operation::read_attribute(Address::root(), "local-host-name"),
        )
        .await
        .unwrap();
        assert_eq!(value, json!("master"));
    }

    #[tokio::test]
    async fn execute_for_result_reports_failed_operation() {
        let mut mock = MockManagementClient::new();
        mock.expect_execute()
            .withf(|request| request.operation_name() == "stop-servers")
            .returning(|_| {
                Ok(json!({"outcome": "failed", "failure-description": "not a domain"}))
            });

        let err = execute_for_result(&mock, Operation::root("stop-servers"))
            .await
            .unwrap_err();
        match err {
            Error::OperationFailed { operation, description } => {
                assert!(operation.contains("stop-servers"));
                assert_eq!(description, "not a domain");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
