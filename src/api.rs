use std::future::Future;
use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::chat::attachment::mime_type;
use crate::chat::{
    Dispatch, OutboundRequest, ResponseEvent, ResponseEventKind, ResponseMode, Ticket,
};
use crate::errors::{CliError, with_debug_hint};

pub const BATCH_PATH: &str = "/upload";
pub const STREAM_PATH: &str = "/upload_stream";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const LOGGED_BODY_CHARS: usize = 300;

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    timeout: Option<Duration>,
    debug: bool,
}

impl ApiClient {
    /// `timeout_ms` bounds the wait for the response head and every gap between
    /// body chunks; 0 disables it.
    pub fn new(base_url: String, timeout_ms: u64, debug: bool) -> Result<Self, CliError> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url,
            timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            debug,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Batch mode: posts to `/upload`, emitting `Opened` then `Payload`.
    pub async fn run_batch(
        &self,
        ticket: Ticket,
        request: &OutboundRequest,
        events: &mpsc::UnboundedSender<ResponseEvent>,
    ) -> Result<(), CliError> {
        let response = self.post_form(BATCH_PATH, request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(self.http_error(status, response).await);
        }
        let _ = events.send(ResponseEvent::new(ticket, ResponseEventKind::Opened));

        let text = self.with_timeout(response.text()).await??;
        let payload = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str::<Value>(&text)
                .map_err(|e| CliError::Stream(format!("Response was not valid JSON: {e}")))?
        };
        let _ = events.send(ResponseEvent::new(ticket, ResponseEventKind::Payload(payload)));
        Ok(())
    }

    /// Streaming mode: posts to `/upload_stream`, emitting `Opened`, one `Chunk`
    /// per body read, then `Finished`.
    pub async fn run_stream(
        &self,
        ticket: Ticket,
        request: &OutboundRequest,
        events: &mpsc::UnboundedSender<ResponseEvent>,
    ) -> Result<(), CliError> {
        let response = self.post_form(STREAM_PATH, request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(self.http_error(status, response).await);
        }
        if matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT) {
            return Err(CliError::Stream(format!(
                "Stream not available: HTTP {} has no body.",
                status.as_u16()
            )));
        }
        let _ = events.send(ResponseEvent::new(ticket, ResponseEventKind::Opened));

        let mut body = response.bytes_stream();
        let mut received = 0usize;
        while let Some(chunk) = self.with_timeout(body.next()).await? {
            let chunk = chunk?;
            received += chunk.len();
            if events
                .send(ResponseEvent::new(ticket, ResponseEventKind::Chunk(chunk)))
                .is_err()
            {
                tracing::debug!(ticket = ticket.0, "response receiver dropped, stopping stream");
                return Ok(());
            }
        }

        tracing::debug!(ticket = ticket.0, bytes = received, "stream finished");
        let _ = events.send(ResponseEvent::new(ticket, ResponseEventKind::Finished));
        Ok(())
    }

    async fn post_form(&self, path: &str, request: &OutboundRequest) -> Result<Response, CliError> {
        let form = build_form(request).await?;
        let url = join_url(&self.base_url, path);
        let started = Instant::now();
        tracing::debug!(%url, has_file = request.file.is_some(), "posting form");

        let response = self
            .with_timeout(self.client.post(&url).multipart(form).send())
            .await?
            .map_err(|err| {
                let message = if err.is_timeout() {
                    "Request timed out.".to_string()
                } else {
                    format!("Network request failed: {err}")
                };
                CliError::Network(with_debug_hint(&message, self.debug))
            })?;

        tracing::debug!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "response head received"
        );
        Ok(response)
    }

    async fn with_timeout<F: Future>(&self, fut: F) -> Result<F::Output, CliError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                CliError::Network(with_debug_hint(
                    &format!("No response from server within {} ms.", limit.as_millis()),
                    self.debug,
                ))
            }),
            None => Ok(fut.await),
        }
    }

    async fn http_error(&self, status: StatusCode, response: Response) -> CliError {
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.trim().chars().take(LOGGED_BODY_CHARS).collect();
        tracing::warn!(status = status.as_u16(), body = %snippet, "server rejected request");

        let mut details = format!("Request failed with status {}", status.as_u16());
        if self.debug && !snippet.is_empty() {
            details.push_str(&format!(": {snippet}"));
        } else {
            details = with_debug_hint(&details, self.debug);
        }
        CliError::Status(details)
    }
}

impl Dispatch for ApiClient {
    fn dispatch(
        &self,
        ticket: Ticket,
        mode: ResponseMode,
        request: OutboundRequest,
        events: mpsc::UnboundedSender<ResponseEvent>,
    ) {
        let api = self.clone();
        tokio::spawn(async move {
            let result = match mode {
                ResponseMode::Batch => api.run_batch(ticket, &request, &events).await,
                ResponseMode::Stream => api.run_stream(ticket, &request, &events).await,
            };
            if let Err(err) = result {
                let _ = events.send(ResponseEvent::new(ticket, ResponseEventKind::Failed(err)));
            }
        });
    }
}

async fn build_form(request: &OutboundRequest) -> Result<Form, CliError> {
    let mut form = Form::new().text("query", request.query.clone());
    if let Some(file) = &request.file {
        let bytes = tokio::fs::read(&file.path).await.map_err(|e| {
            CliError::Attachment(format!("Cannot read {}: {e}", file.path.display()))
        })?;
        let part = Part::bytes(bytes)
            .file_name(file.name.clone())
            .mime_str(mime_type(&file.name))?;
        form = form.part("file", part);
    }
    Ok(form)
}

fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
