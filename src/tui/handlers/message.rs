// Applies response events from the dispatcher to the chat screen.

use crate::chat::{Dispatch, ResponseEvent, SubmissionOutcome};
use crate::tui::types::App;

pub fn handle_response_event<D: Dispatch>(app: &mut App<D>, event: ResponseEvent) {
    let was_submitting = app.controller.is_submitting();
    app.controller.handle_event(event);

    if was_submitting && !app.controller.is_submitting() {
        app.status = settled_status(app.controller.last_outcome());
    } else if app.controller.is_submitting() && !app.surface().loading {
        app.status = "Receiving…".to_string();
    }
}

fn settled_status(outcome: Option<&SubmissionOutcome>) -> String {
    match outcome {
        Some(SubmissionOutcome::Completed) | None => "Ready".to_string(),
        Some(SubmissionOutcome::Failed(err)) => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::chat::{
        ChatController, ChatSettings, OutboundRequest, ResponseEventKind, ResponseMode, Ticket,
    };
    use crate::errors::CliError;
    use crate::tui::types::TuiSurface;

    struct Noop;

    impl Dispatch for Noop {
        fn dispatch(
            &self,
            _ticket: Ticket,
            _mode: ResponseMode,
            _request: OutboundRequest,
            _events: mpsc::UnboundedSender<ResponseEvent>,
        ) {
        }
    }

    fn submitted_app() -> (App<Noop>, Ticket) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let controller = ChatController::new(
            TuiSurface {
                input: "question".chars().collect(),
                ..TuiSurface::default()
            },
            Noop,
            tx,
            ChatSettings {
                mode: ResponseMode::Stream,
                fallback_message: "fallback".to_string(),
                allowed_extensions: Vec::new(),
            },
        );
        let mut app = App::new(controller, "http://localhost:5000".to_string(), "default".to_string());
        app.controller.submit();
        let ticket = app.controller.in_flight_ticket().unwrap();
        (app, ticket)
    }

    #[test]
    fn status_follows_stream_progress() {
        let (mut app, ticket) = submitted_app();
        assert!(app.surface().loading);

        handle_response_event(
            &mut app,
            ResponseEvent::new(ticket, ResponseEventKind::Chunk(Bytes::from_static(b"hi"))),
        );
        assert_eq!(app.status, "Receiving…");
        assert!(!app.surface().loading);

        handle_response_event(&mut app, ResponseEvent::new(ticket, ResponseEventKind::Finished));
        assert_eq!(app.status, "Ready");
        assert_eq!(app.transcript().messages().last().unwrap().plain_text(), "hi");
    }

    #[test]
    fn failure_is_reported_in_status() {
        let (mut app, ticket) = submitted_app();
        handle_response_event(
            &mut app,
            ResponseEvent::new(
                ticket,
                ResponseEventKind::Failed(CliError::Status("HTTP 500".to_string())),
            ),
        );
        assert_eq!(app.status, "HTTP 500");
        assert_eq!(app.transcript().messages().last().unwrap().plain_text(), "fallback");
        assert!(app.surface().controls_enabled);
    }
}
