use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use crossterm::cursor::Show;
use crossterm::event::{DisableBracketedPaste, EnableBracketedPaste};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::block::{Position, Title};
use ratatui::widgets::{Block, BorderType, Borders, Clear, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use tokio::sync::mpsc;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::Runtime;
use crate::chat::attachment::format_file_size;
use crate::chat::{
    ChatController, Dispatch, Message, MessageBody, ResponseEvent, Sender, SubmissionOutcome,
};
use crate::errors::CliError;
use crate::tui::handlers::{handle_event, handle_response_event};
use crate::tui::types::{App, Mode, TuiSurface};

#[derive(Debug, Args)]
pub struct TuiArgs {
    /// Stage an image before the first message
    #[arg(long)]
    pub attach: Option<PathBuf>,
}

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self, CliError> {
        enable_raw_mode()
            .map_err(|e| CliError::Generic(format!("Failed to enable raw mode: {e}")))?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)
            .map_err(|e| CliError::Generic(format!("Failed to enter alternate screen: {e}")))?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = execute!(stdout, DisableBracketedPaste, Show, LeaveAlternateScreen);
    }
}

pub async fn handle(runtime: &Runtime, args: TuiArgs) -> Result<(), CliError> {
    if runtime.output.json {
        return Err(CliError::Usage(
            "`--json` is not supported for `chatbox tui`.".to_string(),
        ));
    }

    let api = runtime.api_client()?;
    let api_url = api.base_url().to_string();
    let profile = runtime.active_profile();

    let (tx, mut rx) = mpsc::unbounded_channel::<ResponseEvent>();
    let controller = ChatController::new(TuiSurface::default(), api, tx, runtime.chat_settings());
    let mut app = App::new(controller, api_url, profile);

    if let Some(path) = args.attach.as_deref() {
        app.controller.attach(Some(path))?;
        app.surface_mut().attach_input = path.display().to_string();
    }
    tracing::info!(api = %app.api_url, profile = %app.profile, mode = app.controller.mode().as_str(), "tui started");

    let guard = TerminalGuard::enter()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)
        .map_err(|e| CliError::Generic(format!("Failed to init terminal: {e}")))?;
    terminal
        .clear()
        .map_err(|e| CliError::Generic(format!("Failed to clear terminal: {e}")))?;
    terminal
        .hide_cursor()
        .map_err(|e| CliError::Generic(format!("Failed to hide cursor: {e}")))?;

    loop {
        update_spinner(&mut app);
        terminal
            .draw(|f| ui(f, &mut app))
            .map_err(|e| CliError::Generic(format!("Failed to draw: {e}")))?;

        if app.should_quit {
            break;
        }

        while let Ok(event) = rx.try_recv() {
            handle_response_event(&mut app, event);
        }

        // Poll faster while a reply is pending so streamed text shows promptly.
        let poll_ms = if app.controller.is_submitting() { 30 } else { 120 };
        if crossterm::event::poll(Duration::from_millis(poll_ms))
            .map_err(|e| CliError::Generic(format!("Event poll failed: {e}")))?
        {
            let event = crossterm::event::read()
                .map_err(|e| CliError::Generic(format!("Event read failed: {e}")))?;
            if let Err(err) = handle_event(&mut app, event) {
                tracing::warn!(error = %err, "key handler failed");
                app.status = format!("Error: {err}");
            }
        }
    }

    terminal
        .show_cursor()
        .map_err(|e| CliError::Generic(format!("Failed to restore cursor: {e}")))?;
    drop(guard);
    Ok(())
}

const MIN_INPUT_HEIGHT: u16 = 3;
const MAX_INPUT_HEIGHT: u16 = 8;
const PREVIEW_MAX_WIDTH: usize = 48;
const INPUT_PREFIX: &str = "> ";

fn ui<D: Dispatch>(f: &mut Frame<'_>, app: &mut App<D>) {
    let size = f.area();

    let has_attachment = app.controller.attachment().is_some();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(if has_attachment { 1 } else { 0 }),
            Constraint::Length(input_height(app.surface().line_count())),
            Constraint::Length(1),
        ])
        .split(size);

    let (chat_area, debug_area) = if app.show_debug {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(72), Constraint::Percentage(28)])
            .split(layout[0]);
        (cols[0], Some(cols[1]))
    } else {
        (layout[0], None)
    };

    f.render_widget(render_chat(app, chat_area), chat_area);
    if let Some(area) = debug_area {
        f.render_widget(render_debug(app), area);
    }

    if has_attachment {
        f.render_widget(render_attachment_strip(app, layout[1]), layout[1]);
    }

    let input_area = layout[2];
    f.render_widget(render_input(app), input_area);
    if app.mode == Mode::Chat {
        let (line, _) = app.surface().cursor_position();
        let col = app.surface().cursor_display_column();
        let prefix_w = INPUT_PREFIX.width() as u16;
        let visible_rows = input_area.height.saturating_sub(2).max(1) as usize;
        let row = line.min(visible_rows.saturating_sub(1)) as u16;
        let x = input_area
            .x
            .saturating_add(1)
            .saturating_add(prefix_w)
            .saturating_add(col as u16);
        let y = input_area.y.saturating_add(1).saturating_add(row);
        f.set_cursor_position((x.min(input_area.x + input_area.width.saturating_sub(2)), y));
    }

    render_info_bar(f, app, layout[3]);

    match app.mode {
        Mode::AttachPrompt => {
            let area = centered_rect(70, 30, size);
            f.render_widget(Clear, area);
            render_text_prompt_popup(f, app, area);
        }
        Mode::Help => {
            let area = centered_rect(70, 60, size);
            f.render_widget(Clear, area);
            f.render_widget(render_help(), area);
        }
        Mode::Chat => {}
    }
}

/// Input box grows with its content, borders included.
fn input_height(lines: usize) -> u16 {
    (lines as u16).saturating_add(2).clamp(MIN_INPUT_HEIGHT, MAX_INPUT_HEIGHT)
}

fn render_chat<D: Dispatch>(app: &App<D>, area: Rect) -> Paragraph<'static> {
    let width = area.width.saturating_sub(2).max(1) as usize;
    let height = area.height.saturating_sub(2).max(1) as usize;

    let mut all_lines = build_chat_lines(app.transcript().messages(), width);
    if app.surface().loading {
        all_lines.push(typing_line(app.spinner_step, app.spinner_last));
    }

    let text = Text::from(chat_window(
        all_lines,
        height,
        app.transcript().scroll_from_bottom(),
    ));

    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title("Chat (PgUp/PgDn scroll, F1 help)")
        .border_style(Style::default().fg(c_sparkle()));
    let url_budget = width.saturating_sub(36);
    if url_budget > 8 {
        block = block.title(
            Title::from(Line::from(vec![Span::styled(
                format!(" {} ", tail_truncate_to_width(&app.api_url, url_budget)),
                Style::default().fg(c_muted()).add_modifier(Modifier::DIM),
            )]))
            .alignment(Alignment::Right)
            .position(Position::Top),
        );
    }

    // Lines are pre-wrapped to the pane, so one line is one row.
    Paragraph::new(text).block(block)
}

/// Rows shown in a pane `height` rows tall, `scroll_from_bottom` rows up
/// from the newest one.
fn chat_window(
    mut lines: Vec<Line<'static>>,
    height: usize,
    scroll_from_bottom: usize,
) -> Vec<Line<'static>> {
    let total = lines.len();
    let max_scroll = total.saturating_sub(height);
    let top = max_scroll.saturating_sub(scroll_from_bottom.min(max_scroll));
    let end = (top + height).min(total);
    lines.truncate(end);
    lines.drain(..top);
    lines
}

fn render_debug<D: Dispatch>(app: &App<D>) -> Paragraph<'static> {
    let surface = app.surface();
    let lines = vec![
        Line::from(vec![Span::styled(
            "Debug",
            Style::default().add_modifier(Modifier::BOLD),
        )]),
        Line::from(format!("profile={}", app.profile)),
        Line::from(format!("mode={}", app.controller.mode().as_str())),
        Line::from(format!("submitting={}", app.controller.is_submitting())),
        Line::from(format!(
            "ticket={}",
            app.controller
                .in_flight_ticket()
                .map(|t| t.0.to_string())
                .unwrap_or_else(|| "-".to_string())
        )),
        Line::from(format!(
            "last={}",
            match app.controller.last_outcome() {
                Some(SubmissionOutcome::Completed) => "completed",
                Some(SubmissionOutcome::Failed(_)) => "failed",
                None => "-",
            }
        )),
        Line::from(format!("loading={}", surface.loading)),
        Line::from(format!("controls={}", surface.controls_enabled)),
        Line::from(format!("messages={}", surface.transcript.messages().len())),
        Line::from(format!("scroll={}", surface.transcript.scroll_from_bottom())),
        Line::from(""),
        Line::from("Ctrl+D: hide"),
    ];

    Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title("Info"))
        .wrap(Wrap { trim: false })
}

fn render_attachment_strip<D: Dispatch>(app: &App<D>, area: Rect) -> Paragraph<'static> {
    let Some(staged) = app.controller.attachment() else {
        return Paragraph::new("");
    };
    let label = format!(
        " 📎 {} ({})  Ctrl+X remove",
        staged.name,
        format_file_size(staged.size)
    );
    Paragraph::new(Line::from(vec![Span::styled(
        truncate_to_width(&label, area.width as usize),
        Style::default().fg(c_star()),
    )]))
}

fn render_input<D: Dispatch>(app: &App<D>) -> Paragraph<'static> {
    let surface = app.surface();
    let text = surface.input.iter().collect::<String>();
    let indent = " ".repeat(INPUT_PREFIX.width());

    let lines: Vec<Line<'static>> = text
        .split('\n')
        .enumerate()
        .map(|(idx, line)| {
            let lead = if idx == 0 {
                Span::styled(
                    INPUT_PREFIX,
                    Style::default().fg(c_heart()).add_modifier(Modifier::BOLD),
                )
            } else {
                Span::raw(indent.clone())
            };
            Line::from(vec![lead, Span::raw(line.to_string())])
        })
        .collect();

    // Keep the cursor's line visible once the box stops growing.
    let visible = (MAX_INPUT_HEIGHT - 2) as usize;
    let (cursor_line, _) = surface.cursor_position();
    let skip = (cursor_line + 1).saturating_sub(visible);
    let lines: Vec<Line<'static>> = lines.into_iter().skip(skip).collect();

    let (title, border) = if surface.controls_enabled {
        (
            "Message (Enter send, Alt+Enter newline, Ctrl+O attach)",
            c_muted(),
        )
    } else {
        ("Waiting for reply…", c_heart())
    };

    Paragraph::new(Text::from(lines)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(title)
            .border_style(Style::default().fg(border)),
    )
}

fn render_info_bar<D: Dispatch>(f: &mut Frame<'_>, app: &App<D>, area: Rect) {
    let state = if app.surface().loading {
        format!("{} waiting", spinner_glyph(app.spinner_step))
    } else if app.controller.is_submitting() {
        format!("{} receiving", spinner_glyph(app.spinner_step))
    } else {
        "idle".to_string()
    };

    let sep = || Span::styled("  |  ", Style::default().fg(c_muted()).add_modifier(Modifier::DIM));
    let spans = vec![
        Span::styled(
            format!(" mode: {}", app.controller.mode().as_str()),
            Style::default().fg(c_sparkle()),
        ),
        sep(),
        Span::styled(
            state,
            if app.controller.is_submitting() {
                Style::default().fg(c_warn())
            } else {
                Style::default().fg(c_ok())
            },
        ),
        sep(),
        Span::styled(app.status.clone(), Style::default().fg(Color::White)),
    ];

    let bar = Paragraph::new(Line::from(spans))
        .style(Style::default().bg(Color::Rgb(30, 30, 40)).fg(Color::White));
    f.render_widget(bar, area);
}

fn render_text_prompt_popup<D: Dispatch>(f: &mut Frame<'_>, app: &mut App<D>, area: Rect) {
    let prompt = app
        .text_prompt
        .as_ref()
        .map(|p| p.prompt.clone())
        .unwrap_or_else(|| "Input".to_string());
    let input = app
        .text_prompt
        .as_ref()
        .map(|p| p.value())
        .unwrap_or_default();
    let cursor = app.text_prompt.as_ref().map(|p| p.cursor).unwrap_or(0);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title("Attach (Enter confirm, Esc cancel)")
        .border_style(Style::default().fg(c_sparkle()));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let prefix = "> ";
    let lines = vec![
        Line::from(vec![Span::styled(
            prompt,
            Style::default().fg(c_muted()).add_modifier(Modifier::DIM),
        )]),
        Line::from(""),
        Line::from(vec![
            Span::styled(prefix, Style::default().fg(c_sparkle()).add_modifier(Modifier::BOLD)),
            Span::raw(input.clone()),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled(
            app.status.clone(),
            Style::default().fg(c_warn()),
        )]),
    ];

    f.render_widget(Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false }), inner);

    let cursor_w: usize = input
        .chars()
        .take(cursor)
        .map(|ch| UnicodeWidthChar::width(ch).unwrap_or(0))
        .sum();
    let x = inner
        .x
        .saturating_add(prefix.width() as u16)
        .saturating_add(cursor_w as u16);
    let y = inner.y.saturating_add(2);
    if x < inner.x + inner.width && y < inner.y + inner.height {
        f.set_cursor_position((x, y));
    }
}

fn render_help() -> Paragraph<'static> {
    let lines = vec![
        Line::from(vec![Span::styled(
            "chatbox",
            Style::default().add_modifier(Modifier::BOLD),
        )]),
        Line::from(""),
        Line::from("Enter: send message"),
        Line::from("Alt+Enter / Shift+Enter / Ctrl+J: new line"),
        Line::from("Ctrl+O: attach an image"),
        Line::from("Ctrl+X: remove the attached image"),
        Line::from("Ctrl+T: switch between stream and batch replies"),
        Line::from("PgUp/PgDn: scroll chat"),
        Line::from("Ctrl+D: toggle debug panel"),
        Line::from("Esc / Ctrl+C: quit"),
        Line::from(""),
        Line::from("Lines starting with a number and `)` in replies are shown in bold."),
    ];

    Paragraph::new(Text::from(lines))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Help (Esc to close)"),
        )
        .wrap(Wrap { trim: false })
}

fn c_star() -> Color {
    Color::Rgb(255, 205, 86)
}

fn c_heart() -> Color {
    Color::Rgb(255, 45, 149)
}

fn c_sparkle() -> Color {
    Color::Rgb(0, 255, 255)
}

fn c_ok() -> Color {
    Color::Rgb(22, 163, 74)
}

fn c_warn() -> Color {
    Color::Rgb(245, 158, 11)
}

fn c_muted() -> Color {
    Color::Rgb(100, 116, 139)
}

const SPINNER_INTERVAL_MS: u64 = 275;
const SPINNER_FRAMES: &[&str] = &["⣤", "⣰", "⢸", "⠹", "⠛", "⠏", "⡇", "⣆"];

fn update_spinner<D: Dispatch>(app: &mut App<D>) {
    if !app.controller.is_submitting() {
        return;
    }
    let now = Instant::now();
    if now.duration_since(app.spinner_last) >= Duration::from_millis(SPINNER_INTERVAL_MS) {
        app.spinner_last = now;
        app.spinner_step = app.spinner_step.wrapping_add(1);
    }
}

fn spinner_glyph(step: u64) -> &'static str {
    SPINNER_FRAMES[(step % SPINNER_FRAMES.len() as u64) as usize]
}

/// Loading row shown under the transcript until the reply starts.
fn typing_line(spinner_step: u64, spinner_last: Instant) -> Line<'static> {
    const TYPING_INTERVAL_MS: u128 = 60;
    let elapsed_ms = (spinner_step as u128) * (SPINNER_INTERVAL_MS as u128)
        + Instant::now().duration_since(spinner_last).as_millis();
    let idx = ((elapsed_ms / TYPING_INTERVAL_MS) % (SPINNER_FRAMES.len() as u128)) as usize;

    let mut spans = sender_prefix(Sender::Bot);
    spans.push(Span::styled(
        SPINNER_FRAMES[idx],
        Style::default().fg(c_muted()).add_modifier(Modifier::BOLD),
    ));
    Line::from(spans)
}

fn sender_prefix(sender: Sender) -> Vec<Span<'static>> {
    let (tag, style) = match sender {
        Sender::User => ("You", Style::default().fg(c_ok()).add_modifier(Modifier::BOLD)),
        Sender::Bot => ("Bot", Style::default().fg(c_sparkle()).add_modifier(Modifier::BOLD)),
    };
    vec![Span::styled(format!("[{tag}] "), style)]
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    let vertical = popup_layout[1];
    let popup_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical);

    popup_layout[1]
}

/// Lays out the transcript as terminal lines: a `[You]`/`[Bot]` tag on the first
/// line of each entry, wrapped continuation lines indented under it, numbered
/// reply lines in bold and the attachment preview under the user's text.
fn build_chat_lines(messages: &[Message], width: usize) -> Vec<Line<'static>> {
    let mut out = Vec::new();

    for msg in messages {
        let prefix_spans = sender_prefix(msg.sender);
        let prefix_len = spans_width(&prefix_spans);
        let indent = " ".repeat(prefix_len);
        let avail = width.saturating_sub(prefix_len).max(1);

        let mut body: Vec<(String, Style)> = Vec::new();
        match &msg.body {
            MessageBody::Text(text) => {
                for line in text.replace("\r\n", "\n").split('\n') {
                    body.push((line.to_string(), Style::default()));
                }
            }
            MessageBody::Markup(markup) => {
                for runs in markup.lines() {
                    let strong = runs.iter().any(|(_, strong)| *strong);
                    let line = runs.iter().map(|(text, _)| *text).collect::<String>();
                    let style = if strong {
                        Style::default().add_modifier(Modifier::BOLD)
                    } else {
                        Style::default()
                    };
                    body.push((line, style));
                }
            }
        }
        if body.len() == 1 && body[0].0.is_empty() {
            body.clear();
        }

        let mut first = true;
        for (line, style) in body {
            let wrapped = if line.is_empty() {
                vec![String::new()]
            } else {
                wrap_line(&line, avail)
            };
            for part in wrapped {
                let lead = if first {
                    first = false;
                    prefix_spans.clone()
                } else {
                    vec![Span::raw(indent.clone())]
                };
                let mut spans = lead;
                spans.push(Span::styled(part, style));
                out.push(Line::from(spans));
            }
        }

        if let Some(attachment) = &msg.attachment {
            let label = format!("📎 {} <{}>", attachment.name, attachment.preview.uri);
            let shown = truncate_to_width(&label, avail.min(PREVIEW_MAX_WIDTH));
            let lead = if first {
                first = false;
                prefix_spans.clone()
            } else {
                vec![Span::raw(indent.clone())]
            };
            let mut spans = lead;
            spans.push(Span::styled(
                shown,
                Style::default().fg(c_star()).add_modifier(Modifier::ITALIC),
            ));
            out.push(Line::from(spans));
        }

        if first {
            out.push(Line::from(prefix_spans));
        }

        // spacer line between messages
        out.push(Line::from(""));
    }
    out
}

/// Breaks `line` into rows at most `width` columns wide. Breaks fall on
/// whitespace where possible; longer words are split mid-word. The first row
/// keeps its leading indent and inner runs of spaces survive.
fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut cur_w = 0usize;
    // byte offset just past the last whitespace in `cur` that follows a word
    let mut brk: Option<usize> = None;

    for ch in line.chars() {
        let cw = UnicodeWidthChar::width(ch).unwrap_or(0);
        if ch.is_whitespace() && cur.is_empty() && !out.is_empty() {
            continue;
        }
        if cur_w + cw > width && !cur.is_empty() && ch.is_whitespace() {
            out.push(cur.trim_end().to_string());
            cur.clear();
            cur_w = 0;
            brk = None;
            continue;
        }
        while cur_w + cw > width && !cur.is_empty() {
            match brk.take() {
                Some(at) => {
                    let rest = cur.split_off(at);
                    out.push(cur.trim_end().to_string());
                    cur_w = rest.as_str().width();
                    cur = rest;
                }
                None => {
                    out.push(std::mem::take(&mut cur));
                    cur_w = 0;
                }
            }
        }
        cur.push(ch);
        cur_w += cw;
        if ch.is_whitespace() && !cur.trim().is_empty() {
            brk = Some(cur.len());
        }
    }

    if !cur.is_empty() || out.is_empty() {
        out.push(cur);
    }
    out
}

fn truncate_to_width(input: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if input.width() <= max_width {
        return input.to_string();
    }

    const ELLIPSIS: &str = "…";
    let ell_w = ELLIPSIS.width();
    if max_width <= ell_w {
        return ELLIPSIS.to_string();
    }

    let mut out = String::new();
    let mut w = 0usize;
    for ch in input.chars() {
        let cw = UnicodeWidthChar::width(ch).unwrap_or(0);
        if w + cw + ell_w > max_width {
            break;
        }
        out.push(ch);
        w += cw;
    }
    out.push_str(ELLIPSIS);
    out
}

fn tail_truncate_to_width(input: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if input.width() <= max_width {
        return input.to_string();
    }
    if max_width <= 2 {
        return "..".chars().take(max_width).collect();
    }

    let keep_w = max_width - 2;
    let mut tail_rev = String::new();
    let mut w = 0usize;
    for ch in input.chars().rev() {
        let cw = UnicodeWidthChar::width(ch).unwrap_or(0);
        if w + cw > keep_w {
            break;
        }
        tail_rev.push(ch);
        w += cw;
    }
    let tail: String = tail_rev.chars().rev().collect();
    format!("..{tail}")
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|s| s.content.width()).sum()
}
