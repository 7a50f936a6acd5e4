// Chat core: attachment staging, line formatting, the submission gate,
// the transcript model, response consumption and the controller tying them together.

pub mod attachment;
pub mod consumer;
pub mod controller;
pub mod format;
pub mod gate;
pub mod surface;
pub mod transcript;

use std::path::PathBuf;

use bytes::Bytes;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::errors::CliError;

pub use controller::{ChatController, ChatSettings, SubmissionOutcome, SubmitOutcome};
pub use surface::ChatSurface;
pub use transcript::{Message, MessageBody, Sender, Transcript};

/// "An error occurred while processing the request. Please try again."
pub const DEFAULT_FALLBACK_MESSAGE: &str = "Đã xảy ra lỗi khi xử lý yêu cầu. Vui lòng thử lại.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// One JSON payload from `/upload`.
    Batch,
    /// Incremental text body from `/upload_stream`.
    #[default]
    Stream,
}

impl ResponseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseMode::Batch => "batch",
            ResponseMode::Stream => "stream",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "batch" => Some(Self::Batch),
            "stream" | "streaming" => Some(Self::Stream),
            _ => None,
        }
    }
}

/// Identifies one dispatched submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFile {
    pub path: PathBuf,
    pub name: String,
}

/// Form fields sent to either endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub query: String,
    pub file: Option<OutboundFile>,
}

#[derive(Debug, Clone)]
pub enum ResponseEventKind {
    /// Response head arrived with a usable body.
    Opened,
    /// Batch mode body.
    Payload(Value),
    /// Streaming mode body bytes, in arrival order.
    Chunk(Bytes),
    /// Streaming body reached its end.
    Finished,
    Failed(CliError),
}

#[derive(Debug)]
pub struct ResponseEvent {
    pub ticket: Ticket,
    pub kind: ResponseEventKind,
}

impl ResponseEvent {
    pub fn new(ticket: Ticket, kind: ResponseEventKind) -> Self {
        Self { ticket, kind }
    }
}

/// Sends a request on its way; results come back through `events`.
pub trait Dispatch {
    fn dispatch(
        &self,
        ticket: Ticket,
        mode: ResponseMode,
        request: OutboundRequest,
        events: mpsc::UnboundedSender<ResponseEvent>,
    );
}
