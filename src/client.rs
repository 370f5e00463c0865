use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use reqwest::header::{self, HeaderValue};
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::types::ChatRequest;

/// The chat completions endpoint.
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// An incremental response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// The status and body of one HTTP exchange.
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `retry-after` header in seconds, if the server sent one.
    pub retry_after: Option<u64>,
    body: ByteStream,
}

impl HttpResponse {
    /// Wrap a status and a body stream.
    pub fn new(status: u16, body: ByteStream) -> Self {
        Self {
            status,
            retry_after: None,
            body,
        }
    }

    /// A response whose body arrives in one piece.
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self::new(status, Box::pin(stream::once(async move { Ok(body) })))
    }

    /// A response whose body arrives as the given chunks.
    pub fn from_chunks(status: u16, chunks: Vec<Bytes>) -> Self {
        Self::new(status, Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }

    /// Attach a `retry-after` value.
    pub fn with_retry_after(mut self, seconds: Option<u64>) -> Self {
        self.retry_after = seconds;
        self
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Take the body stream.
    pub fn into_body(self) -> ByteStream {
        self.body
    }

    /// Read the whole body as UTF-8 text.
    pub async fn text(self) -> Result<String> {
        let mut body = self.body;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        String::from_utf8(buffer.to_vec()).map_err(|e| {
            Error::encoding(format!("Invalid UTF-8 in response: {e}"), Some(Box::new(e)))
        })
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("retry_after", &self.retry_after)
            .finish_non_exhaustive()
    }
}

/// Something that can POST a chat request.
///
/// Implementations return `Ok` for every HTTP status; only failures to get a
/// status at all (timeouts, refused connections) are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `request` as JSON, giving up after `timeout`.
    async fn post(&self, request: &ChatRequest, timeout: Duration) -> Result<HttpResponse>;
}

/// [`Transport`] over HTTPS with bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: ReqwestClient,
    url: Url,
    api_key: String,
}

impl HttpTransport {
    /// A transport for the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_url(api_key, DEFAULT_API_URL)
    }

    /// A transport for a custom endpoint.
    pub fn with_url(api_key: impl Into<String>, url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| Error::url(format!("Invalid API URL {url}: {e}"), Some(e)))?;
        let client = ReqwestClient::builder().build().map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {e}"),
                Some(Box::new(e)),
            )
        })?;
        Ok(Self {
            client,
            url,
            api_key: api_key.into(),
        })
    }

    /// The endpoint requests go to.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: &ChatRequest, timeout: Duration) -> Result<HttpResponse> {
        let accept = if request.is_streaming() {
            HeaderValue::from_static("text/event-stream")
        } else {
            HeaderValue::from_static("application/json")
        };
        let send = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.api_key)
            .header(header::ACCEPT, accept)
            .json(request)
            .send();
        let response = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| {
                Error::timeout(
                    format!("Request timed out after {}s", timeout.as_secs()),
                    Some(timeout.as_secs_f64()),
                )
            })?
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {e}"),
                        Some(timeout.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
                }
            })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());
        let body = response.bytes_stream().map(|result| {
            result.map_err(|e| {
                Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e)))
            })
        });
        let body = idle_timeout(Box::pin(body), timeout);
        Ok(HttpResponse::new(status, body).with_retry_after(retry_after))
    }
}

/// End `body` with a streaming error once no chunk arrives for `idle`.
///
/// The limit applies between chunks, so a body that keeps arriving may take
/// any amount of time in total.
pub fn idle_timeout(body: ByteStream, idle: Duration) -> ByteStream {
    Box::pin(stream::unfold(Some(body), move |body| async move {
        let mut body = body?;
        match tokio::time::timeout(idle, body.next()).await {
            Ok(Some(chunk)) => Some((chunk, Some(body))),
            Ok(None) => None,
            Err(_) => Some((
                Err(Error::streaming(
                    format!("no data received for {}s", idle.as_secs_f64()),
                    None,
                )),
                None,
            )),
        }
    }))
}

/// Convert a non-2xx response into the matching [`Error`].
pub async fn process_error_response(response: HttpResponse) -> Error {
    let status_code = response.status;
    let retry_after = response.retry_after;

    #[derive(Deserialize)]
    struct ErrorResponse {
        error: Option<ErrorDetail>,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
        param: Option<String>,
    }

    let error_body = match response.text().await {
        Ok(body) => body,
        Err(e) => return e,
    };

    let detail = serde_json::from_str::<ErrorResponse>(&error_body)
        .ok()
        .and_then(|e| e.error);
    let error_type = detail.as_ref().and_then(|d| d.error_type.clone());
    let error_param = detail.as_ref().and_then(|d| d.param.clone());
    let error_message = detail
        .and_then(|d| d.message)
        .unwrap_or(error_body);

    match status_code {
        400 => Error::bad_request(error_message, error_param),
        401 => Error::authentication(error_message),
        403 => Error::permission(error_message),
        404 => Error::not_found(error_message),
        408 => Error::timeout(error_message, None),
        429 => Error::rate_limit(error_message, retry_after),
        500 => Error::internal_server(error_message),
        502..=504 => Error::service_unavailable(error_message, retry_after),
        _ => Error::api(status_code, error_type, error_message),
    }
}
