use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use rehydrate::cache::CacheSource;
use rehydrate::lifecycle::LifecycleEvent;
use std::time::Duration;
use tokio::sync::mpsc;

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Terminal focus changed; treated as the app moving to/from the background
  Lifecycle(LifecycleEvent),
  /// Periodic tick for UI refresh
  Tick,
  /// A fetch started by the app finished
  Fetched {
    key: String,
    result: Result<CacheSource, String>,
  },
}

/// Event handler that produces events from terminal input and a tick timer
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // crossterm polling blocks, keep it off the async workers
    let reader_tx = tx.clone();
    tokio::task::spawn_blocking(move || loop {
      let event = if event::poll(tick_rate).unwrap_or(false) {
        match event::read() {
          Ok(CrosstermEvent::Key(key)) if key.kind == KeyEventKind::Press => Some(Event::Key(key)),
          Ok(CrosstermEvent::FocusLost) => Some(Event::Lifecycle(LifecycleEvent::Background)),
          Ok(CrosstermEvent::FocusGained) => Some(Event::Lifecycle(LifecycleEvent::Foreground)),
          _ => None,
        }
      } else {
        Some(Event::Tick)
      };

      if let Some(event) = event {
        if reader_tx.send(event).is_err() {
          break;
        }
      }
    });

    Self { tx, rx }
  }

  /// Sender for async tasks that report back into the event loop
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
