// Keyboard handling for the chat screen and its popups.

use std::path::PathBuf;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::chat::attachment::format_file_size;
use crate::chat::{Dispatch, ResponseMode, SubmitOutcome};
use crate::errors::CliError;
use crate::tui::types::{App, Mode, TextPromptState};

const SCROLL_STEP: usize = 5;

pub fn handle_event<D: Dispatch>(app: &mut App<D>, event: Event) -> Result<(), CliError> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
            handle_key(app, key)?;
        }
        Event::Paste(text) if app.mode == Mode::Chat => {
            for ch in text.chars().filter(|c| *c != '\r') {
                app.surface_mut().insert_char(ch);
            }
        }
        _ => {}
    }
    Ok(())
}

pub fn handle_key<D: Dispatch>(app: &mut App<D>, key: KeyEvent) -> Result<(), CliError> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    if ctrl && key.code == KeyCode::Char('c') {
        app.should_quit = true;
        return Ok(());
    }

    match app.mode {
        Mode::Help => {
            if matches!(
                key.code,
                KeyCode::Esc | KeyCode::Enter | KeyCode::F(1) | KeyCode::Char('q')
            ) {
                app.mode = Mode::Chat;
            }
            return Ok(());
        }
        Mode::AttachPrompt => {
            handle_attach_prompt_key(app, key, ctrl);
            return Ok(());
        }
        Mode::Chat => {}
    }

    match key.code {
        KeyCode::Esc => app.should_quit = true,
        KeyCode::F(1) => app.mode = Mode::Help,
        KeyCode::Char('d') if ctrl => app.show_debug = !app.show_debug,
        KeyCode::Char('o') if ctrl => open_attach_prompt(app),
        KeyCode::Char('x') if ctrl => {
            if app.controller.remove_attachment() {
                app.status = "Attachment removed".to_string();
            }
        }
        KeyCode::Char('t') if ctrl => toggle_mode(app),
        KeyCode::Char('j') if ctrl => app.surface_mut().insert_newline(),
        KeyCode::PageUp => app.surface_mut().transcript.scroll_up(SCROLL_STEP),
        KeyCode::PageDown => app.surface_mut().transcript.scroll_down(SCROLL_STEP),
        KeyCode::Enter
            if key
                .modifiers
                .intersects(KeyModifiers::ALT | KeyModifiers::SHIFT) =>
        {
            app.surface_mut().insert_newline();
        }
        KeyCode::Enter => submit(app),
        KeyCode::Backspace => app.surface_mut().backspace(),
        KeyCode::Delete => app.surface_mut().delete(),
        KeyCode::Left => app.surface_mut().move_left(),
        KeyCode::Right => app.surface_mut().move_right(),
        KeyCode::Home => app.surface_mut().move_home(),
        KeyCode::End => app.surface_mut().move_end(),
        KeyCode::Char(ch) => {
            if ctrl {
                return Ok(());
            }
            app.surface_mut().insert_char(ch);
        }
        _ => {}
    }
    Ok(())
}

fn submit<D: Dispatch>(app: &mut App<D>) {
    match app.controller.submit() {
        SubmitOutcome::Dispatched(_) => {
            app.status = format!("Sending ({})…", app.controller.mode().as_str());
        }
        SubmitOutcome::Empty => {
            app.status = "Type a message or attach an image first".to_string();
        }
        SubmitOutcome::Busy => {
            app.status = "Still waiting for the previous reply".to_string();
        }
    }
}

fn open_attach_prompt<D: Dispatch>(app: &mut App<D>) {
    if !app.surface().controls_enabled {
        app.status = "Attachments are disabled while a reply is pending".to_string();
        return;
    }
    let initial = app.surface().attach_input.clone();
    app.text_prompt = Some(TextPromptState::new("Path to an image", &initial));
    app.mode = Mode::AttachPrompt;
}

fn toggle_mode<D: Dispatch>(app: &mut App<D>) {
    let next = match app.controller.mode() {
        ResponseMode::Stream => ResponseMode::Batch,
        ResponseMode::Batch => ResponseMode::Stream,
    };
    app.controller.set_mode(next);
    app.status = if app.controller.is_submitting() {
        format!("Mode: {} (from the next message)", next.as_str())
    } else {
        format!("Mode: {}", next.as_str())
    };
}

fn handle_attach_prompt_key<D: Dispatch>(app: &mut App<D>, key: KeyEvent, ctrl: bool) {
    let Some(mut st) = app.text_prompt.take() else {
        app.mode = Mode::Chat;
        return;
    };

    match key.code {
        KeyCode::Esc => {
            app.mode = Mode::Chat;
            return;
        }
        KeyCode::Enter => {
            let value = st.value();
            let trimmed = value.trim();
            if trimmed.is_empty() {
                app.mode = Mode::Chat;
                return;
            }
            let path = expand_home(trimmed);
            match app.controller.attach(Some(&path)) {
                Ok(true) => {
                    app.surface_mut().attach_input = trimmed.to_string();
                    if let Some(staged) = app.controller.attachment() {
                        app.status = format!(
                            "Attached {} ({})",
                            staged.name,
                            format_file_size(staged.size)
                        );
                    }
                    app.mode = Mode::Chat;
                    return;
                }
                Ok(false) => {
                    app.mode = Mode::Chat;
                    return;
                }
                Err(err) => {
                    tracing::info!(error = %err, "attachment rejected");
                    app.status = err.to_string();
                }
            }
        }
        KeyCode::Backspace => {
            if st.cursor > 0 && st.cursor <= st.input.len() {
                st.cursor -= 1;
                st.input.remove(st.cursor);
            }
        }
        KeyCode::Left => st.cursor = st.cursor.saturating_sub(1),
        KeyCode::Right => st.cursor = (st.cursor + 1).min(st.input.len()),
        KeyCode::Home => st.cursor = 0,
        KeyCode::End => st.cursor = st.input.len(),
        KeyCode::Char(ch) if !ctrl => {
            if st.cursor > st.input.len() {
                st.cursor = st.input.len();
            }
            st.input.insert(st.cursor, ch);
            st.cursor += 1;
        }
        _ => {}
    }
    app.text_prompt = Some(st);
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;

    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use super::*;
    use crate::chat::{
        ChatController, ChatSettings, OutboundRequest, ResponseEvent, ResponseEventKind, Sender,
        Ticket,
    };
    use crate::tui::types::TuiSurface;

    #[derive(Clone, Default)]
    struct Recorder {
        sent: Rc<RefCell<Vec<(ResponseMode, OutboundRequest)>>>,
    }

    impl Dispatch for Recorder {
        fn dispatch(
            &self,
            _ticket: Ticket,
            mode: ResponseMode,
            request: OutboundRequest,
            _events: mpsc::UnboundedSender<ResponseEvent>,
        ) {
            self.sent.borrow_mut().push((mode, request));
        }
    }

    fn app() -> (App<Recorder>, Recorder) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let recorder = Recorder::default();
        let controller = ChatController::new(
            TuiSurface::default(),
            recorder.clone(),
            tx,
            ChatSettings {
                mode: ResponseMode::Stream,
                fallback_message: "oops".to_string(),
                allowed_extensions: vec!["png".to_string()],
            },
        );
        (
            App::new(controller, "http://localhost:5000".to_string(), "default".to_string()),
            recorder,
        )
    }

    fn press(app: &mut App<Recorder>, code: KeyCode) {
        handle_key(app, KeyEvent::new(code, KeyModifiers::NONE)).unwrap();
    }

    fn press_with(app: &mut App<Recorder>, code: KeyCode, modifiers: KeyModifiers) {
        handle_key(app, KeyEvent::new(code, modifiers)).unwrap();
    }

    fn type_text(app: &mut App<Recorder>, text: &str) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch));
        }
    }

    #[test]
    fn enter_submits_and_modified_enter_adds_a_line() {
        let (mut app, recorder) = app();
        type_text(&mut app, "line one");
        press_with(&mut app, KeyCode::Enter, KeyModifiers::SHIFT);
        type_text(&mut app, "two");
        press_with(&mut app, KeyCode::Char('j'), KeyModifiers::CONTROL);
        type_text(&mut app, "three");
        assert_eq!(app.surface().line_count(), 3);

        press(&mut app, KeyCode::Enter);
        let sent = recorder.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.query, "line one\ntwo\nthree");
        assert!(app.surface().input.is_empty());
        assert!(app.controller.is_submitting());
    }

    #[test]
    fn enter_while_waiting_keeps_the_draft() {
        let (mut app, recorder) = app();
        type_text(&mut app, "first");
        press(&mut app, KeyCode::Enter);
        type_text(&mut app, "second");
        press(&mut app, KeyCode::Enter);

        assert_eq!(recorder.sent.borrow().len(), 1);
        assert_eq!(app.surface().input.iter().collect::<String>(), "second");
        assert_eq!(app.status, "Still waiting for the previous reply");
    }

    #[test]
    fn attach_prompt_stages_file_and_rejects_wrong_type() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("cat.png");
        let bad = dir.path().join("notes.txt");
        fs::write(&good, b"png").unwrap();
        fs::write(&bad, b"text").unwrap();

        let (mut app, recorder) = app();
        press_with(&mut app, KeyCode::Char('o'), KeyModifiers::CONTROL);
        assert_eq!(app.mode, Mode::AttachPrompt);
        type_text(&mut app, &bad.display().to_string());
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.mode, Mode::AttachPrompt);
        assert!(app.status.contains("Unsupported file type"));
        assert!(app.controller.attachment().is_none());

        app.text_prompt = Some(TextPromptState::new("Path", &good.display().to_string()));
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.mode, Mode::Chat);
        assert_eq!(app.controller.attachment().map(|a| a.name.as_str()), Some("cat.png"));

        press(&mut app, KeyCode::Enter);
        let sent = recorder.sent.borrow();
        assert_eq!(sent[0].1.query, "");
        assert_eq!(sent[0].1.file.as_ref().map(|f| f.name.as_str()), Some("cat.png"));
        assert!(app.surface().attach_input.is_empty());
    }

    #[test]
    fn attach_prompt_is_unavailable_while_submitting() {
        let (mut app, _recorder) = app();
        type_text(&mut app, "q");
        press(&mut app, KeyCode::Enter);
        press_with(&mut app, KeyCode::Char('o'), KeyModifiers::CONTROL);
        assert_eq!(app.mode, Mode::Chat);
        assert!(app.text_prompt.is_none());
    }

    #[test]
    fn ctrl_x_drops_the_staged_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dog.png");
        fs::write(&path, b"png").unwrap();

        let (mut app, _recorder) = app();
        app.controller.attach(Some(&path)).unwrap();
        press_with(&mut app, KeyCode::Char('x'), KeyModifiers::CONTROL);
        assert!(app.controller.attachment().is_none());
        assert_eq!(app.status, "Attachment removed");
    }

    #[test]
    fn toggling_mode_applies_to_next_dispatch() {
        let (mut app, recorder) = app();
        press_with(&mut app, KeyCode::Char('t'), KeyModifiers::CONTROL);
        assert_eq!(app.controller.mode(), ResponseMode::Batch);
        type_text(&mut app, "hi");
        press(&mut app, KeyCode::Enter);
        assert_eq!(recorder.sent.borrow()[0].0, ResponseMode::Batch);
    }

    #[test]
    fn paging_scrolls_transcript_and_help_closes() {
        let (mut app, _recorder) = app();
        app.surface_mut()
            .transcript
            .append_user_message("hello", None);
        press(&mut app, KeyCode::PageUp);
        assert_eq!(app.transcript().scroll_from_bottom(), SCROLL_STEP);
        press(&mut app, KeyCode::PageDown);
        assert_eq!(app.transcript().scroll_from_bottom(), 0);
        assert_eq!(app.transcript().messages()[0].sender, Sender::User);

        press(&mut app, KeyCode::F(1));
        assert_eq!(app.mode, Mode::Help);
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.mode, Mode::Chat);
        assert!(!app.should_quit);
        press(&mut app, KeyCode::Esc);
        assert!(app.should_quit);
    }

    #[test]
    fn finished_event_reenables_controls() {
        let (mut app, _recorder) = app();
        type_text(&mut app, "q");
        press(&mut app, KeyCode::Enter);
        let ticket = app.controller.in_flight_ticket().unwrap();
        app.controller
            .handle_event(ResponseEvent::new(ticket, ResponseEventKind::Finished));
        assert!(app.surface().controls_enabled);
        assert!(!app.surface().loading);
    }
}
