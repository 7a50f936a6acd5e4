// TUI state: the screen mode, the editable input and the chat surface the
// controller drives.

use std::time::Instant;

use unicode_width::UnicodeWidthChar;

use crate::api::ApiClient;
use crate::chat::{ChatController, ChatSurface, Dispatch, Transcript};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Chat,
    AttachPrompt,
    Help,
}

#[derive(Debug, Clone, Default)]
pub struct TextPromptState {
    pub prompt: String,
    pub input: Vec<char>,
    pub cursor: usize,
}

impl TextPromptState {
    pub fn new(prompt: impl Into<String>, initial: &str) -> Self {
        let input: Vec<char> = initial.chars().collect();
        Self {
            prompt: prompt.into(),
            cursor: input.len(),
            input,
        }
    }

    pub fn value(&self) -> String {
        self.input.iter().collect()
    }
}

/// Everything the chat screen shows besides the popups.
#[derive(Debug)]
pub struct TuiSurface {
    pub transcript: Transcript,
    pub input: Vec<char>,
    pub cursor: usize,
    /// Last path typed into the attach prompt; cleared with the staged file.
    pub attach_input: String,
    pub loading: bool,
    pub controls_enabled: bool,
}

impl Default for TuiSurface {
    fn default() -> Self {
        Self {
            transcript: Transcript::new(),
            input: Vec::new(),
            cursor: 0,
            attach_input: String::new(),
            loading: false,
            controls_enabled: true,
        }
    }
}

impl TuiSurface {
    pub fn insert_char(&mut self, ch: char) {
        if self.cursor > self.input.len() {
            self.cursor = self.input.len();
        }
        self.input.insert(self.cursor, ch);
        self.cursor += 1;
    }

    pub fn insert_newline(&mut self) {
        self.insert_char('\n');
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 && self.cursor <= self.input.len() {
            self.cursor -= 1;
            self.input.remove(self.cursor);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.input.len() {
            self.input.remove(self.cursor);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.input.len());
    }

    /// Start of the current input line.
    pub fn move_home(&mut self) {
        let (line, _) = self.cursor_position();
        self.cursor = self.line_start(line);
    }

    /// End of the current input line.
    pub fn move_end(&mut self) {
        let start = self.cursor.min(self.input.len());
        self.cursor = self.input[start..]
            .iter()
            .position(|c| *c == '\n')
            .map(|offset| start + offset)
            .unwrap_or(self.input.len());
    }

    pub fn line_count(&self) -> usize {
        self.input.iter().filter(|c| **c == '\n').count() + 1
    }

    /// Zero-based `(line, column)` of the cursor, counted in chars.
    pub fn cursor_position(&self) -> (usize, usize) {
        let upto = &self.input[..self.cursor.min(self.input.len())];
        let line = upto.iter().filter(|c| **c == '\n').count();
        let col = upto.iter().rev().take_while(|c| **c != '\n').count();
        (line, col)
    }

    /// Terminal columns taken by the current line up to the cursor.
    pub fn cursor_display_column(&self) -> usize {
        let upto = &self.input[..self.cursor.min(self.input.len())];
        upto.iter()
            .rev()
            .take_while(|c| **c != '\n')
            .map(|c| UnicodeWidthChar::width(*c).unwrap_or(0))
            .sum()
    }

    fn line_start(&self, line: usize) -> usize {
        if line == 0 {
            return 0;
        }
        let mut seen = 0;
        for (idx, ch) in self.input.iter().enumerate() {
            if *ch == '\n' {
                seen += 1;
                if seen == line {
                    return idx + 1;
                }
            }
        }
        self.input.len()
    }
}

impl ChatSurface for TuiSurface {
    fn input_text(&self) -> String {
        self.input.iter().collect()
    }

    fn clear_input(&mut self) {
        self.input.clear();
        self.cursor = 0;
    }

    fn clear_attachment_control(&mut self) {
        self.attach_input.clear();
    }

    fn set_loading(&mut self, visible: bool) {
        self.loading = visible;
    }

    fn set_controls_enabled(&mut self, enabled: bool) {
        self.controls_enabled = enabled;
    }

    fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }
}

pub struct App<D: Dispatch = ApiClient> {
    pub mode: Mode,
    pub should_quit: bool,

    pub api_url: String,
    pub profile: String,
    pub status: String,
    pub spinner_step: u64,
    pub spinner_last: Instant,
    pub show_debug: bool,

    pub text_prompt: Option<TextPromptState>,
    pub controller: ChatController<TuiSurface, D>,
}

impl<D: Dispatch> App<D> {
    pub fn new(
        controller: ChatController<TuiSurface, D>,
        api_url: String,
        profile: String,
    ) -> Self {
        Self {
            mode: Mode::Chat,
            should_quit: false,
            api_url,
            profile,
            status: "Ready".to_string(),
            spinner_step: 0,
            spinner_last: Instant::now(),
            show_debug: false,
            text_prompt: None,
            controller,
        }
    }

    pub fn surface(&self) -> &TuiSurface {
        self.controller.surface()
    }

    pub fn surface_mut(&mut self) -> &mut TuiSurface {
        self.controller.surface_mut()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.controller.surface().transcript
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_with(text: &str, cursor: usize) -> TuiSurface {
        TuiSurface {
            input: text.chars().collect(),
            cursor,
            ..TuiSurface::default()
        }
    }

    #[test]
    fn editing_tracks_cursor_across_lines() {
        let mut s = TuiSurface::default();
        for ch in "ab".chars() {
            s.insert_char(ch);
        }
        s.insert_newline();
        s.insert_char('c');
        assert_eq!(s.input_text(), "ab\nc");
        assert_eq!(s.line_count(), 2);
        assert_eq!(s.cursor_position(), (1, 1));

        s.backspace();
        s.backspace();
        assert_eq!(s.input_text(), "ab");
        assert_eq!(s.cursor_position(), (0, 2));
    }

    #[test]
    fn cursor_column_counts_wide_chars_twice() {
        let s = surface_with("ab\n日本x", 5);
        assert_eq!(s.cursor_position(), (1, 2));
        assert_eq!(s.cursor_display_column(), 4);
    }

    #[test]
    fn home_and_end_stay_on_current_line() {
        let mut s = surface_with("first\nsecond\nthird", 8);
        assert_eq!(s.cursor_position(), (1, 2));
        s.move_home();
        assert_eq!(s.cursor, 6);
        s.move_end();
        assert_eq!(s.cursor, 12);

        let mut last = surface_with("first\nthird", 7);
        last.move_end();
        assert_eq!(last.cursor, 11);
    }

    #[test]
    fn clearing_resets_input_and_attach_text() {
        let mut s = surface_with("hello", 5);
        s.attach_input = "/tmp/cat.png".to_string();
        s.clear_input();
        s.clear_attachment_control();
        assert_eq!(s.cursor, 0);
        assert!(s.input.is_empty());
        assert!(s.attach_input.is_empty());
    }
}
