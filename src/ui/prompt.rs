use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Result of handling a key event in a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptResult {
  /// Key was handled, keep prompting
  Consumed,
  /// Enter pressed, here's the submitted value
  Submitted(String),
  /// Escape pressed, prompt cancelled
  Cancelled,
  /// Key not handled, pass to next handler
  NotHandled,
}

/// Single-line text prompt. The cursor counts characters, not bytes.
#[derive(Debug, Clone, Default)]
pub struct Prompt {
  buffer: String,
  cursor: usize,
}

impl Prompt {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn value(&self) -> &str {
    &self.buffer
  }

  pub fn clear(&mut self) {
    self.buffer.clear();
    self.cursor = 0;
  }

  /// Cursor position in characters, for rendering
  pub fn cursor(&self) -> usize {
    self.cursor
  }

  fn byte_offset(&self, chars: usize) -> usize {
    self
      .buffer
      .char_indices()
      .nth(chars)
      .map(|(i, _)| i)
      .unwrap_or(self.buffer.len())
  }

  fn char_len(&self) -> usize {
    self.buffer.chars().count()
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> PromptResult {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
      KeyCode::Esc => PromptResult::Cancelled,
      KeyCode::Enter => PromptResult::Submitted(self.buffer.clone()),
      KeyCode::Backspace => {
        if self.cursor > 0 {
          self.cursor -= 1;
          let at = self.byte_offset(self.cursor);
          self.buffer.remove(at);
        }
        PromptResult::Consumed
      }
      KeyCode::Delete => {
        if self.cursor < self.char_len() {
          let at = self.byte_offset(self.cursor);
          self.buffer.remove(at);
        }
        PromptResult::Consumed
      }
      KeyCode::Left => {
        self.cursor = self.cursor.saturating_sub(1);
        PromptResult::Consumed
      }
      KeyCode::Right => {
        self.cursor = (self.cursor + 1).min(self.char_len());
        PromptResult::Consumed
      }
      KeyCode::Home => {
        self.cursor = 0;
        PromptResult::Consumed
      }
      KeyCode::End => {
        self.cursor = self.char_len();
        PromptResult::Consumed
      }
      KeyCode::Char('a') if ctrl => {
        self.cursor = 0;
        PromptResult::Consumed
      }
      KeyCode::Char('e') if ctrl => {
        self.cursor = self.char_len();
        PromptResult::Consumed
      }
      KeyCode::Char('u') if ctrl => {
        // Clear line before cursor
        let at = self.byte_offset(self.cursor);
        self.buffer.drain(..at);
        self.cursor = 0;
        PromptResult::Consumed
      }
      KeyCode::Char(_) if ctrl => PromptResult::NotHandled,
      KeyCode::Char(c) => {
        let at = self.byte_offset(self.cursor);
        self.buffer.insert(at, c);
        self.cursor += 1;
        PromptResult::Consumed
      }
      _ => PromptResult::NotHandled,
    }
  }
}
