use std::path::Path;

use tokio::sync::mpsc;

use crate::chat::attachment::{AttachmentStager, PendingAttachment};
use crate::chat::consumer::{StreamSession, consume_batch, consume_chunk, finish_stream};
use crate::chat::format::format_lines;
use crate::chat::gate::SubmissionGate;
use crate::chat::surface::ChatSurface;
use crate::chat::transcript::AttachmentSummary;
use crate::chat::{
    Dispatch, OutboundFile, OutboundRequest, ResponseEvent, ResponseEventKind, ResponseMode,
    Ticket,
};
use crate::errors::CliError;

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub mode: ResponseMode,
    pub fallback_message: String,
    pub allowed_extensions: Vec<String>,
}

/// Result of a submit trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A submission is already in flight.
    Busy,
    /// No text and no attachment.
    Empty,
    Dispatched(Ticket),
}

/// How the last dispatched submission settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Completed,
    Failed(CliError),
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    ticket: Ticket,
    mode: ResponseMode,
}

/// Submission state machine: `Idle -> Submitting -> Idle`.
///
/// `submit` runs everything up to dispatch synchronously, so the gate is held
/// before the request leaves. Response events are fed back through
/// `handle_event`; the submission settles exactly once per ticket.
pub struct ChatController<S, D> {
    surface: S,
    dispatcher: D,
    events: mpsc::UnboundedSender<ResponseEvent>,
    settings: ChatSettings,
    gate: SubmissionGate,
    stager: AttachmentStager,
    in_flight: Option<InFlight>,
    session: Option<StreamSession>,
    loading: bool,
    next_ticket: u64,
    last_outcome: Option<SubmissionOutcome>,
}

impl<S: ChatSurface, D: Dispatch> ChatController<S, D> {
    pub fn new(
        surface: S,
        dispatcher: D,
        events: mpsc::UnboundedSender<ResponseEvent>,
        settings: ChatSettings,
    ) -> Self {
        let stager = AttachmentStager::new(settings.allowed_extensions.clone());
        Self {
            surface,
            dispatcher,
            events,
            settings,
            gate: SubmissionGate::new(),
            stager,
            in_flight: None,
            session: None,
            loading: false,
            next_ticket: 1,
            last_outcome: None,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn mode(&self) -> ResponseMode {
        self.settings.mode
    }

    /// Applies to the next submission; one already in flight keeps its mode.
    pub fn set_mode(&mut self, mode: ResponseMode) {
        self.settings.mode = mode;
    }

    pub fn is_submitting(&self) -> bool {
        self.gate.is_held()
    }

    pub fn in_flight_ticket(&self) -> Option<Ticket> {
        self.in_flight.map(|f| f.ticket)
    }

    pub fn last_outcome(&self) -> Option<&SubmissionOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn attachment(&self) -> Option<&PendingAttachment> {
        self.stager.current()
    }

    /// Stages a file unless a submission is in flight. `None` is ignored.
    pub fn attach(&mut self, path: Option<&Path>) -> Result<bool, CliError> {
        if self.gate.is_held() {
            tracing::debug!("attach ignored while submitting");
            return Ok(false);
        }
        self.stager.stage(path)
    }

    pub fn remove_attachment(&mut self) -> bool {
        if self.gate.is_held() || self.stager.current().is_none() {
            return false;
        }
        self.stager.clear();
        self.surface.clear_attachment_control();
        true
    }

    pub fn submit(&mut self) -> SubmitOutcome {
        if self.gate.is_held() {
            tracing::debug!("submit ignored, a submission is in flight");
            return SubmitOutcome::Busy;
        }

        let query = self.surface.input_text().trim().to_string();
        if query.is_empty() && self.stager.current().is_none() {
            return SubmitOutcome::Empty;
        }

        let attachment = self.stager.take();
        let file = attachment.as_ref().map(|a| OutboundFile {
            path: a.path.clone(),
            name: a.name.clone(),
        });

        self.surface
            .transcript_mut()
            .append_user_message(&query, attachment.map(AttachmentSummary::from));
        self.surface.clear_input();
        self.surface.clear_attachment_control();

        self.show_loading(true);
        let acquired = self.gate.try_acquire();
        debug_assert!(acquired, "gate was checked free above");
        self.surface.set_controls_enabled(false);

        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        let mode = self.settings.mode;
        self.in_flight = Some(InFlight { ticket, mode });

        tracing::info!(
            ticket = ticket.0,
            mode = mode.as_str(),
            query_len = query.len(),
            has_file = file.is_some(),
            "dispatching submission"
        );
        self.dispatcher.dispatch(
            ticket,
            mode,
            OutboundRequest { query, file },
            self.events.clone(),
        );
        SubmitOutcome::Dispatched(ticket)
    }

    pub fn handle_event(&mut self, event: ResponseEvent) {
        let Some(flight) = self.in_flight else {
            tracing::debug!(ticket = event.ticket.0, "event with nothing in flight ignored");
            return;
        };
        if flight.ticket != event.ticket {
            tracing::warn!(
                ticket = event.ticket.0,
                current = flight.ticket.0,
                "stale response event ignored"
            );
            return;
        }

        match event.kind {
            ResponseEventKind::Opened => {
                self.show_loading(false);
                if flight.mode == ResponseMode::Stream {
                    self.ensure_session();
                }
            }
            ResponseEventKind::Payload(payload) => {
                self.show_loading(false);
                consume_batch(
                    self.surface.transcript_mut(),
                    &payload,
                    &self.settings.fallback_message,
                );
                self.settle(SubmissionOutcome::Completed);
            }
            ResponseEventKind::Chunk(bytes) => {
                self.show_loading(false);
                self.ensure_session();
                if let Some(session) = self.session.as_mut() {
                    consume_chunk(self.surface.transcript_mut(), session, &bytes);
                }
            }
            ResponseEventKind::Finished => {
                if let Some(session) = self.session.as_mut() {
                    finish_stream(self.surface.transcript_mut(), session);
                }
                self.settle(SubmissionOutcome::Completed);
            }
            ResponseEventKind::Failed(err) => {
                tracing::warn!(ticket = flight.ticket.0, error = %err, "submission failed");
                self.show_loading(false);
                let fallback = format_lines(&self.settings.fallback_message);
                self.surface.transcript_mut().append_bot_message(fallback);
                self.settle(SubmissionOutcome::Failed(err));
            }
        }
    }

    fn ensure_session(&mut self) {
        if self.session.is_none() {
            let handle = self.surface.transcript_mut().append_bot_placeholder();
            self.session = Some(StreamSession::new(handle));
        }
    }

    fn show_loading(&mut self, visible: bool) {
        if self.loading != visible {
            self.loading = visible;
            self.surface.set_loading(visible);
        }
    }

    fn settle(&mut self, outcome: SubmissionOutcome) {
        let Some(flight) = self.in_flight.take() else {
            return;
        };
        self.session = None;
        self.show_loading(false);
        self.gate.release();
        self.surface.set_controls_enabled(true);
        tracing::info!(ticket = flight.ticket.0, outcome = ?outcome, "submission settled");
        self.last_outcome = Some(outcome);
    }
}
