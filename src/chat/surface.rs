use crate::chat::transcript::Transcript;

/// The UI elements a [`ChatController`](crate::chat::ChatController) drives.
///
/// Handed to the controller at construction; the TUI and the one-shot `ask`
/// command each provide their own.
pub trait ChatSurface {
    /// Current contents of the text input, untrimmed.
    fn input_text(&self) -> String;

    fn clear_input(&mut self);

    /// Resets the file picker control and its preview.
    fn clear_attachment_control(&mut self);

    fn set_loading(&mut self, visible: bool);

    /// Enables or disables the submit and attachment controls together.
    fn set_controls_enabled(&mut self, enabled: bool);

    fn transcript(&self) -> &Transcript;

    fn transcript_mut(&mut self) -> &mut Transcript;
}
