use crate::client::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT, LogtailClient, LogtailClientInner, headers};
use reqwest::{
    Url,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use std::{str::FromStr, sync::Arc, time::Duration};

type UrlParseError = <Url as FromStr>::Err;

/// Builder error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LogtailClientBuilderError {
    /// Missing required field in the builder.
    #[error("missing required field: {0}")]
    Missing(&'static str),
    /// The source token cannot be sent as an HTTP header.
    #[error("source token is not a valid header value")]
    InvalidToken,
    /// The ingestion endpoint is not a valid URL.
    #[error("invalid endpoint `{endpoint}`: {source}")]
    InvalidEndpoint {
        /// The rejected endpoint.
        endpoint: String,
        /// Parse failure.
        source: UrlParseError,
    },
    /// The endpoint is not HTTPS while `https_only` is enabled.
    #[error("endpoint `{0}` is not https")]
    InsecureEndpoint(String),
    /// The underlying HTTP client could not be constructed.
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Builder for creating a [`LogtailClient`] with required and optional parameters.
pub struct LogtailClientBuilder<'a> {
    source_token: Option<&'a str>,
    endpoint: &'a str,
    timeout: Duration,
    https_only: bool,
    enable_trace: bool,
    print_internal_error: bool,
}

type Result<T, E = LogtailClientBuilderError> = std::result::Result<T, E>;

impl Default for LogtailClientBuilder<'_> {
    fn default() -> Self {
        Self {
            source_token: None,
            endpoint: DEFAULT_ENDPOINT,
            timeout: DEFAULT_TIMEOUT,
            https_only: true,
            enable_trace: true,
            print_internal_error: false,
        }
    }
}

impl<'a> LogtailClientBuilder<'a> {
    /// Set the source token sent as `Authorization: Bearer <token>`.
    pub fn source_token(mut self, source_token: &'a str) -> Self {
        self.source_token = Some(source_token);
        self
    }

    /// Set the ingestion endpoint.
    ///
    /// Default is [`DEFAULT_ENDPOINT`].
    pub fn endpoint(mut self, endpoint: &'a str) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Set the timeout of a single delivery attempt.
    ///
    /// Default is 5 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Refuse non-HTTPS endpoints.
    ///
    /// Enabled by default.
    pub fn https_only(mut self, https_only: bool) -> Self {
        self.https_only = https_only;
        self
    }

    /// Enable or disable tracing for the client.
    ///
    /// Enabled by default.
    /// If enabled, client will log via [`tracing`](https://docs.rs/tracing/latest/tracing/) crate.
    pub fn enable_trace(mut self, enable_trace: bool) -> Self {
        self.enable_trace = enable_trace;
        self
    }

    /// Enable or disable printing internal errors to stderr.
    ///
    /// Disabled by default.
    /// If enabled and tracing is not enabled, client will print errors to stderr.
    pub fn print_internal_error(mut self, print_internal_error: bool) -> Self {
        self.print_internal_error = print_internal_error;
        self
    }

    /// Build the client with the provided configuration.
    ///
    /// This does not open any connection.
    pub fn build(self) -> Result<LogtailClient> {
        let source_token = self
            .source_token
            .ok_or(LogtailClientBuilderError::Missing("source_token"))?;

        let url = Url::parse(self.endpoint).map_err(|source| {
            LogtailClientBuilderError::InvalidEndpoint {
                endpoint: self.endpoint.to_string(),
                source,
            }
        })?;
        if self.https_only && url.scheme() != "https" {
            return Err(LogtailClientBuilderError::InsecureEndpoint(
                self.endpoint.to_string(),
            ));
        }

        let mut authorization =
            HeaderValue::from_str(&format!("{}{source_token}", headers::BEARER_PREFIX))
                .map_err(|_| LogtailClientBuilderError::InvalidToken)?;
        authorization.set_sensitive(true);

        let http = reqwest::ClientBuilder::new()
            .user_agent(headers::USER_AGENT_VALUE)
            .https_only(self.https_only)
            .timeout(self.timeout)
            .default_headers(HeaderMap::from_iter([
                (
                    HeaderName::from_static(headers::CONTENT_TYPE),
                    HeaderValue::from_static(headers::DEFAULT_CONTENT_TYPE),
                ),
                (HeaderName::from_static(headers::AUTHORIZATION), authorization),
            ]))
            .build()?;

        let client = LogtailClientInner {
            url,
            http,
            enable_trace: self.enable_trace,
            print_internal_error: self.print_internal_error,
        };

        Ok(LogtailClient {
            inner: Arc::new(client),
        })
    }
}
