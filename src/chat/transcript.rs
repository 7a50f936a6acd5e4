use crate::chat::attachment::{PendingAttachment, PreviewRef};
use crate::chat::format::Markup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
}

/// What a user message shows for the file it carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentSummary {
    pub name: String,
    pub preview: PreviewRef,
}

impl From<PendingAttachment> for AttachmentSummary {
    fn from(value: PendingAttachment) -> Self {
        Self {
            name: value.name,
            preview: value.preview,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Markup(Markup),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: Sender,
    pub body: MessageBody,
    pub attachment: Option<AttachmentSummary>,
}

impl Message {
    pub fn plain_text(&self) -> String {
        match &self.body {
            MessageBody::Text(text) => text.clone(),
            MessageBody::Markup(markup) => markup.plain(),
        }
    }

    pub fn html(&self) -> String {
        match &self.body {
            MessageBody::Text(text) => text.clone(),
            MessageBody::Markup(markup) => markup.to_html(),
        }
    }
}

/// Refers to a bot entry that is still being filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotHandle(usize);

/// Append-only chat log that keeps the newest entry in view.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    scroll_from_bottom: usize,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[cfg(test)]
    pub fn get(&self, handle: BotHandle) -> Option<&Message> {
        self.messages.get(handle.0)
    }

    pub fn append_user_message(&mut self, text: &str, attachment: Option<AttachmentSummary>) {
        self.messages.push(Message {
            sender: Sender::User,
            body: MessageBody::Text(text.to_string()),
            attachment,
        });
        self.scroll_to_end();
    }

    pub fn append_bot_placeholder(&mut self) -> BotHandle {
        self.messages.push(Message {
            sender: Sender::Bot,
            body: MessageBody::Markup(Markup::default()),
            attachment: None,
        });
        self.scroll_to_end();
        BotHandle(self.messages.len() - 1)
    }

    pub fn append_bot_message(&mut self, markup: Markup) {
        self.messages.push(Message {
            sender: Sender::Bot,
            body: MessageBody::Markup(markup),
            attachment: None,
        });
        self.scroll_to_end();
    }

    /// Replaces the placeholder's content wholesale.
    pub fn update_bot_text(&mut self, handle: BotHandle, markup: Markup) {
        match self.messages.get_mut(handle.0) {
            Some(message) if message.sender == Sender::Bot => {
                message.body = MessageBody::Markup(markup);
                self.scroll_to_end();
            }
            _ => tracing::warn!(index = handle.0, "update for unknown bot entry ignored"),
        }
    }

    pub fn scroll_from_bottom(&self) -> usize {
        self.scroll_from_bottom
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_add(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_sub(lines);
    }

    fn scroll_to_end(&mut self) {
        self.scroll_from_bottom = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::format::format_lines;

    #[test]
    fn appends_keep_newest_entry_in_view() {
        let mut transcript = Transcript::new();
        transcript.scroll_up(10);
        transcript.append_user_message("hello", None);
        assert_eq!(transcript.scroll_from_bottom(), 0);

        transcript.scroll_up(3);
        let handle = transcript.append_bot_placeholder();
        assert_eq!(transcript.scroll_from_bottom(), 0);

        transcript.scroll_up(3);
        transcript.update_bot_text(handle, format_lines("hi"));
        assert_eq!(transcript.scroll_from_bottom(), 0);

        transcript.scroll_up(3);
        transcript.append_bot_message(format_lines("again"));
        assert_eq!(transcript.scroll_from_bottom(), 0);
    }

    #[test]
    fn placeholder_starts_empty_and_is_replaced_wholesale() {
        let mut transcript = Transcript::new();
        let handle = transcript.append_bot_placeholder();
        assert_eq!(transcript.get(handle).unwrap().plain_text(), "");

        transcript.update_bot_text(handle, format_lines("1) fi"));
        transcript.update_bot_text(handle, format_lines("1) first"));
        let message = transcript.get(handle).unwrap();
        assert_eq!(message.sender, Sender::Bot);
        assert_eq!(message.html(), "<b>1) first</b>");
        assert_eq!(transcript.messages().len(), 1);
    }

    #[test]
    fn update_never_touches_user_entries() {
        let mut transcript = Transcript::new();
        transcript.append_user_message("question", None);
        transcript.update_bot_text(BotHandle(0), format_lines("hijack"));
        transcript.update_bot_text(BotHandle(7), format_lines("nowhere"));
        assert_eq!(transcript.messages()[0].plain_text(), "question");
    }

    #[test]
    fn scrolling_down_stops_at_the_bottom() {
        let mut transcript = Transcript::new();
        transcript.scroll_up(2);
        transcript.scroll_down(5);
        assert_eq!(transcript.scroll_from_bottom(), 0);
    }
}
