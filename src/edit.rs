/// Inline title editing buffer, seeded with the current title.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleEdit {
    original: String,
    pub buffer: String,
}

impl TitleEdit {
    pub fn new(current: &str) -> TitleEdit {
        TitleEdit {
            original: current.to_string(),
            buffer: current.to_string(),
        }
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn push(&mut self, c: char) {
        self.buffer.push(c);
    }

    pub fn pop(&mut self) {
        self.buffer.pop();
    }

    /// The title to send, or `None` when committing should not touch the server.
    pub fn committed_title(&self) -> Option<String> {
        let trimmed = self.buffer.trim();
        if trimmed.is_empty() || trimmed == self.original {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}
