use std::io::{self, Read};
use std::path::PathBuf;

use clap::Args;
use serde_json::json;
use tokio::sync::mpsc;

use crate::app::Runtime;
use crate::chat::{
    ChatController, ChatSurface, Dispatch, Message, ResponseEvent, Sender, SubmissionOutcome,
    SubmitOutcome, Transcript,
};
use crate::errors::CliError;

#[derive(Debug, Args)]
pub struct AskArgs {
    /// Question text
    pub prompt: Option<String>,
    /// Read the question from stdin
    #[arg(long)]
    pub stdin: bool,
    /// Image to send along with the question
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,
    /// Print the reply as HTML instead of plain text
    #[arg(long)]
    pub html: bool,
}

/// Surface without a screen: the input is fixed up front and the transcript
/// is read back once the submission settles.
#[derive(Debug, Default)]
struct HeadlessSurface {
    input: String,
    transcript: Transcript,
}

impl ChatSurface for HeadlessSurface {
    fn input_text(&self) -> String {
        self.input.clone()
    }

    fn clear_input(&mut self) {
        self.input.clear();
    }

    fn clear_attachment_control(&mut self) {}

    fn set_loading(&mut self, visible: bool) {
        tracing::debug!(visible, "loading indicator");
    }

    fn set_controls_enabled(&mut self, _enabled: bool) {}

    fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }
}

pub async fn handle(runtime: &Runtime, args: AskArgs) -> Result<(), CliError> {
    let query = resolve_prompt(&args)?;
    if query.is_empty() && args.file.is_none() {
        return Err(CliError::Usage(
            "Missing question. Use `chatbox ask \"...\"`, `--stdin` or `--file <image>`."
                .to_string(),
        ));
    }

    let api = runtime.api_client()?;
    runtime
        .output
        .print_verbose(&format!("api={} mode={}", api.base_url(), runtime.resolved_mode().as_str()));

    let (tx, mut rx) = mpsc::unbounded_channel::<ResponseEvent>();
    let surface = HeadlessSurface {
        input: query.clone(),
        transcript: Transcript::new(),
    };
    let mut controller = ChatController::new(surface, api, tx, runtime.chat_settings());
    controller.attach(args.file.as_deref())?;

    let live = !runtime.output.json && !args.html;
    let mut streamed = String::new();
    let outcome = drive(&mut controller, &mut rx, |delta| {
        streamed.push_str(delta);
        if live {
            runtime.output.print_partial(delta)?;
        }
        Ok(())
    })
    .await?;

    let replies = replies(controller.surface().transcript());
    if runtime.output.json {
        let (status, error) = match &outcome {
            SubmissionOutcome::Completed => ("completed", None),
            SubmissionOutcome::Failed(err) => ("failed", Some(err.to_string())),
        };
        runtime.output.print_json(&json!({
            "query": query,
            "reply": replies.iter().map(|m| m.plain_text()).collect::<Vec<_>>().join("\n"),
            "html": replies.iter().map(|m| m.html()).collect::<Vec<_>>().join("<br>"),
            "outcome": status,
            "error": error,
        }))?;
    } else if args.html {
        for reply in replies {
            runtime.output.print_human(&reply.html());
        }
    } else {
        print_remaining(runtime, replies, &streamed)?;
    }

    settled_result(outcome, runtime.output.json)
}

/// Maps the outcome to the command result. The JSON report already carries
/// the error, so it is only turned into an exit code there.
fn settled_result(outcome: SubmissionOutcome, json: bool) -> Result<(), CliError> {
    match outcome {
        SubmissionOutcome::Completed => Ok(()),
        SubmissionOutcome::Failed(err) if json => Err(CliError::Reported(Box::new(err))),
        SubmissionOutcome::Failed(err) => Err(err),
    }
}

/// Submits the surface's input and feeds response events back until the
/// submission settles. `on_delta` receives text appended to the first reply.
async fn drive<D, F>(
    controller: &mut ChatController<HeadlessSurface, D>,
    rx: &mut mpsc::UnboundedReceiver<ResponseEvent>,
    mut on_delta: F,
) -> Result<SubmissionOutcome, CliError>
where
    D: Dispatch,
    F: FnMut(&str) -> Result<(), CliError>,
{
    match controller.submit() {
        SubmitOutcome::Dispatched(ticket) => tracing::debug!(ticket = ticket.0, "ask dispatched"),
        SubmitOutcome::Empty => {
            return Err(CliError::Usage("Nothing to send.".to_string()));
        }
        SubmitOutcome::Busy => {
            return Err(CliError::Generic("A request is already in flight.".to_string()));
        }
    }

    let mut shown = String::new();
    while controller.is_submitting() {
        let Some(event) = rx.recv().await else {
            break;
        };
        controller.handle_event(event);

        if !controller.is_submitting() {
            break;
        }
        if let Some(first) = replies(controller.surface().transcript()).first() {
            let text = first.plain_text();
            if let Some(delta) = unprinted(&text, &shown) {
                if !delta.is_empty() {
                    on_delta(delta)?;
                    shown = text.clone();
                }
            }
        }
    }

    controller
        .last_outcome()
        .cloned()
        .ok_or_else(|| CliError::Generic("Submission ended without an outcome.".to_string()))
}

fn replies(transcript: &Transcript) -> &[Message] {
    let start = transcript
        .messages()
        .iter()
        .position(|m| m.sender == Sender::Bot)
        .unwrap_or(transcript.messages().len());
    &transcript.messages()[start..]
}

/// Part of `full` not yet shown, if what was shown is still its prefix.
fn unprinted<'a>(full: &'a str, shown: &str) -> Option<&'a str> {
    full.strip_prefix(shown)
}

fn print_remaining(runtime: &Runtime, replies: &[Message], streamed: &str) -> Result<(), CliError> {
    let Some((first, rest)) = replies.split_first() else {
        return Ok(());
    };

    let text = first.plain_text();
    match unprinted(&text, streamed) {
        Some(tail) => runtime.output.print_partial(tail)?,
        None => {
            if !streamed.is_empty() {
                runtime.output.print_partial("\n")?;
            }
            runtime.output.print_partial(&text)?;
        }
    }
    runtime.output.print_partial("\n")?;

    for reply in rest {
        runtime.output.print_human(&reply.plain_text());
    }
    Ok(())
}

fn resolve_prompt(args: &AskArgs) -> Result<String, CliError> {
    if args.stdin {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| CliError::Generic(format!("Failed reading stdin: {e}")))?;
        return Ok(input.trim().to_string());
    }
    Ok(args
        .prompt
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::chat::{
        ChatSettings, OutboundRequest, ResponseEventKind, ResponseMode, Ticket,
    };
    use crate::errors::CliError;

    /// Answers every dispatch with a canned event sequence.
    struct Scripted(Vec<ResponseEventKind>);

    impl Dispatch for Scripted {
        fn dispatch(
            &self,
            ticket: Ticket,
            _mode: ResponseMode,
            _request: OutboundRequest,
            events: mpsc::UnboundedSender<ResponseEvent>,
        ) {
            for kind in self.0.clone() {
                let _ = events.send(ResponseEvent::new(ticket, kind));
            }
        }
    }

    fn controller(
        input: &str,
        mode: ResponseMode,
        script: Vec<ResponseEventKind>,
    ) -> (
        ChatController<HeadlessSurface, Scripted>,
        mpsc::UnboundedReceiver<ResponseEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let surface = HeadlessSurface {
            input: input.to_string(),
            transcript: Transcript::new(),
        };
        let settings = ChatSettings {
            mode,
            fallback_message: "sorry".to_string(),
            allowed_extensions: Vec::new(),
        };
        (
            ChatController::new(surface, Scripted(script), tx, settings),
            rx,
        )
    }

    #[tokio::test]
    async fn streamed_reply_is_reported_as_deltas() {
        let (mut ctl, mut rx) = controller(
            "hi",
            ResponseMode::Stream,
            vec![
                ResponseEventKind::Opened,
                ResponseEventKind::Chunk(Bytes::from_static(b"Hel")),
                ResponseEventKind::Chunk(Bytes::from_static(b"lo")),
                ResponseEventKind::Finished,
            ],
        );
        let mut deltas = Vec::new();
        let outcome = drive(&mut ctl, &mut rx, |d| {
            deltas.push(d.to_string());
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(outcome, SubmissionOutcome::Completed);
        assert_eq!(deltas, vec!["Hel".to_string(), "lo".to_string()]);
        let replies = replies(ctl.surface().transcript());
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].plain_text(), "Hello");
    }

    #[tokio::test]
    async fn batch_reply_arrives_at_settle() {
        let (mut ctl, mut rx) = controller(
            "hi",
            ResponseMode::Batch,
            vec![
                ResponseEventKind::Opened,
                ResponseEventKind::Payload(json!({ "result": { "answer": "1) one\n2) two" } })),
            ],
        );
        let mut deltas = 0;
        let outcome = drive(&mut ctl, &mut rx, |_| {
            deltas += 1;
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(outcome, SubmissionOutcome::Completed);
        assert_eq!(deltas, 0);
        assert_eq!(
            replies(ctl.surface().transcript())[0].html(),
            "<b>1) one</b><br><b>2) two</b>"
        );
    }

    #[tokio::test]
    async fn failure_yields_fallback_and_failed_outcome() {
        let (mut ctl, mut rx) = controller(
            "hi",
            ResponseMode::Stream,
            vec![ResponseEventKind::Failed(CliError::Network(
                "connection refused".to_string(),
            ))],
        );
        let outcome = drive(&mut ctl, &mut rx, |_| Ok(())).await.unwrap();

        assert!(matches!(outcome, SubmissionOutcome::Failed(_)));
        let replies = replies(ctl.surface().transcript());
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].plain_text(), "sorry");
    }

    #[tokio::test]
    async fn blank_question_is_rejected_before_dispatch() {
        let (mut ctl, mut rx) = controller("   ", ResponseMode::Stream, Vec::new());
        let err = drive(&mut ctl, &mut rx, |_| Ok(())).await.unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
        assert!(ctl.surface().transcript().messages().is_empty());
    }

    #[tokio::test]
    async fn failed_status_keeps_its_exit_code() {
        let (mut ctl, mut rx) = controller(
            "hi",
            ResponseMode::Stream,
            vec![ResponseEventKind::Failed(CliError::Status(
                "Request failed with status 500".to_string(),
            ))],
        );
        let outcome = drive(&mut ctl, &mut rx, |_| Ok(())).await.unwrap();

        let err = settled_result(outcome.clone(), false).unwrap_err();
        assert_eq!(err, CliError::Status("Request failed with status 500".to_string()));
        assert_eq!(err.exit_code(), 5);

        let reported = settled_result(outcome, true).unwrap_err();
        assert!(reported.is_reported());
        assert_eq!(reported.exit_code(), 5);
        assert_eq!(reported.to_string(), "Request failed with status 500");
    }

    #[test]
    fn completed_outcome_is_ok() {
        assert!(settled_result(SubmissionOutcome::Completed, true).is_ok());
    }

    #[test]
    fn unprinted_requires_shown_prefix() {
        assert_eq!(unprinted("Hello", "Hel"), Some("lo"));
        assert_eq!(unprinted("Hello", ""), Some("Hello"));
        assert_eq!(unprinted("sorry", "Hel"), None);
    }
}
