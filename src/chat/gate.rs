/// Single-flight lock for submissions.
#[derive(Debug, Default)]
pub struct SubmissionGate {
    held: bool,
}

impl SubmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when a submission is already in flight.
    pub fn try_acquire(&mut self) -> bool {
        if self.held {
            return false;
        }
        self.held = true;
        true
    }

    pub fn release(&mut self) {
        self.held = false;
    }

    pub fn is_held(&self) -> bool {
        self.held
    }
}
