use crate::commands::{self, Command};
use crate::event::{Event, EventHandler};
use crate::http::{self, HttpFetcher};
use crate::ui;
use crate::ui::prompt::{Prompt, PromptResult};
use color_eyre::Result;
use crossterm::event::{DisableFocusChange, EnableFocusChange, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use ratatui::widgets::ListState;
use rehydrate::cache::{CacheEntry, CacheLayer, SyncPhase, SyncReport};
use rehydrate::config::Config;
use rehydrate::lifecycle::{AppState, LifecycleEvent, LifecycleObserver};
use std::collections::BTreeSet;
use std::io::stdout;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Input mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
  Normal,
  Command,
  /// Typing a URL to fetch
  Open,
}

/// Follow-up work for a key press that needs the async side of the loop
enum Action {
  None,
  Lifecycle(LifecycleEvent),
  Sync(SyncPhase),
}

/// Undo the terminal setup done in [`App::run`].
fn restore_terminal() -> Result<()> {
  let _ = stdout().execute(DisableFocusChange);
  disable_raw_mode()?;
  stdout().execute(LeaveAlternateScreen)?;
  Ok(())
}

/// Main application state
pub struct App {
  config: Config,

  /// Fetch-layer view of the cache
  cache: CacheLayer,

  /// Forwards focus changes to the synchronizer
  lifecycle: LifecycleObserver,

  /// Latest synchronizer report
  reports: watch::Receiver<Option<SyncReport>>,

  http: HttpFetcher,

  /// Keys currently in memory, refreshed on every tick
  keys: Vec<String>,
  list_state: ListState,

  /// Keys with a fetch in flight
  in_flight: BTreeSet<String>,

  mode: Mode,
  prompt: Prompt,
  selected_suggestion: usize,

  /// One-line message shown in the status bar
  status: Option<String>,

  /// Event sender for async tasks
  event_tx: mpsc::UnboundedSender<Event>,

  should_quit: bool,
}

impl App {
  pub fn new(config: Config, cache: CacheLayer, lifecycle: LifecycleObserver) -> Result<Self> {
    let (tx, _rx) = mpsc::unbounded_channel();
    let reports = lifecycle.synchronizer().reports();

    Ok(Self {
      config,
      cache,
      lifecycle,
      reports,
      http: HttpFetcher::new()?,
      keys: Vec::new(),
      list_state: ListState::default(),
      in_flight: BTreeSet::new(),
      mode: Mode::Normal,
      prompt: Prompt::new(),
      selected_suggestion: 0,
      status: None,
      event_tx: tx,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    // Launch counts as coming to the foreground
    self.lifecycle.on_foreground().await;
    self.refresh_keys();

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableFocusChange)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(Duration::from_millis(250));
    self.event_tx = events.sender();

    let result = self.event_loop(&mut terminal, &mut events).await;

    // Cleanup terminal even if the loop failed
    let restored = restore_terminal();
    self.shutdown(result, restored).await
  }

  /// Persist before surfacing loop or terminal errors.
  async fn shutdown(&mut self, result: Result<()>, restored: Result<()>) -> Result<()> {
    // Leaving is the last chance to persist what was fetched
    self.lifecycle.on_background().await;
    result.and(restored)
  }

  async fn event_loop(
    &mut self,
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      if let Some(event) = events.next().await {
        self.handle_event(event).await;
      }
    }
    Ok(())
  }

  async fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => match self.handle_key(key) {
        Action::None => {}
        Action::Lifecycle(event) => self.handle_lifecycle(event).await,
        Action::Sync(phase) => self.force_sync(phase).await,
      },
      Event::Lifecycle(event) => self.handle_lifecycle(event).await,
      Event::Tick => self.refresh_keys(),
      Event::Fetched { key, result } => {
        self.in_flight.remove(&key);
        self.status = Some(match result {
          Ok(source) => format!("{} ({})", key, source),
          Err(e) => format!("{}: {}", key, e),
        });
        self.refresh_keys();
      }
    }
  }

  async fn handle_lifecycle(&mut self, event: LifecycleEvent) {
    if let Some(report) = self.lifecycle.handle(event).await {
      info!(?event, %report, "Lifecycle transition");
      self.refresh_keys();
    }
  }

  /// Run a hook directly, bypassing the observer's transition check.
  async fn force_sync(&mut self, phase: SyncPhase) {
    let sync = self.lifecycle.synchronizer();
    match phase {
      SyncPhase::Suspend => sync.on_suspend().await,
      SyncPhase::Resume => sync.on_resume().await,
    };
    self.refresh_keys();
  }

  fn handle_key(&mut self, key: KeyEvent) -> Action {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return Action::None;
    }

    match self.mode {
      Mode::Normal => self.handle_normal_mode_key(key),
      Mode::Command => self.handle_command_mode_key(key),
      Mode::Open => {
        self.handle_open_mode_key(key);
        Action::None
      }
    }
  }

  fn handle_normal_mode_key(&mut self, key: KeyEvent) -> Action {
    match key.code {
      KeyCode::Char('q') => self.should_quit = true,

      // Navigation
      KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
      KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),

      // Entry actions
      KeyCode::Char('o') => self.enter_mode(Mode::Open),
      KeyCode::Char('r') => self.revalidate_selected(),
      KeyCode::Char('d') => self.delete_selected(),

      // Simulated visibility changes
      KeyCode::Char('b') => return Action::Lifecycle(LifecycleEvent::Background),
      KeyCode::Char('f') => return Action::Lifecycle(LifecycleEvent::Foreground),

      KeyCode::Char(':') => self.enter_mode(Mode::Command),

      _ => {}
    }
    Action::None
  }

  fn handle_command_mode_key(&mut self, key: KeyEvent) -> Action {
    match key.code {
      KeyCode::Tab | KeyCode::Down => {
        let count = self.autocomplete_suggestions().len();
        if count > 0 {
          self.selected_suggestion = (self.selected_suggestion + 1) % count;
        }
        return Action::None;
      }
      KeyCode::BackTab | KeyCode::Up => {
        let count = self.autocomplete_suggestions().len();
        if count > 0 {
          self.selected_suggestion = (self.selected_suggestion + count - 1) % count;
        }
        return Action::None;
      }
      _ => {}
    }

    match self.prompt.handle_key(key) {
      PromptResult::Submitted(_) => {
        let cmd = self.resolve_command();
        self.enter_mode(Mode::Normal);
        self.execute_command(&cmd)
      }
      PromptResult::Cancelled => {
        self.enter_mode(Mode::Normal);
        Action::None
      }
      PromptResult::Consumed => {
        self.selected_suggestion = 0; // Reset selection on input change
        Action::None
      }
      PromptResult::NotHandled => Action::None,
    }
  }

  fn handle_open_mode_key(&mut self, key: KeyEvent) {
    match self.prompt.handle_key(key) {
      PromptResult::Submitted(input) => {
        self.enter_mode(Mode::Normal);
        match http::parse_url(&input) {
          Ok(url) => self.start_fetch(url, false),
          Err(e) => self.status = Some(e.to_string()),
        }
      }
      PromptResult::Cancelled => self.enter_mode(Mode::Normal),
      PromptResult::Consumed | PromptResult::NotHandled => {}
    }
  }

  fn enter_mode(&mut self, mode: Mode) {
    self.mode = mode;
    self.prompt.clear();
    self.selected_suggestion = 0;
  }

  /// Either the highlighted suggestion or the raw input
  fn resolve_command(&self) -> String {
    match self.autocomplete_suggestions().get(self.selected_suggestion) {
      Some(cmd) => cmd.name.to_string(),
      None => self.prompt.value().trim().to_lowercase(),
    }
  }

  fn execute_command(&mut self, cmd: &str) -> Action {
    match cmd {
      "open" => self.enter_mode(Mode::Open),
      "revalidate" => self.revalidate_selected(),
      "delete" => self.delete_selected(),
      "suspend" => return Action::Sync(SyncPhase::Suspend),
      "resume" => return Action::Sync(SyncPhase::Resume),
      "quit" => self.should_quit = true,
      other => self.status = Some(format!("Unknown command: {}", other)),
    }
    Action::None
  }

  fn start_fetch(&mut self, url: url::Url, force: bool) {
    let key = url.to_string();
    if !self.in_flight.insert(key.clone()) {
      return; // Already fetching this key
    }

    let cache = self.cache.clone();
    let http = self.http.clone();
    let tx = self.event_tx.clone();

    tokio::spawn(async move {
      let fetcher = move || async move { http.fetch_json(&url).await };
      let result = if force {
        cache.revalidate(&key, fetcher).await
      } else {
        cache.fetch(&key, fetcher).await
      };
      if let Err(e) = &result {
        warn!(key = %key, error = %e, "Fetch failed");
      }
      let _ = tx.send(Event::Fetched {
        key,
        result: result.map(|r| r.source).map_err(|e| e.to_string()),
      });
    });
  }

  fn revalidate_selected(&mut self) {
    let Some(key) = self.selected_key().map(String::from) else {
      return;
    };
    match http::parse_url(&key) {
      Ok(url) => self.start_fetch(url, true),
      Err(_) => self.status = Some(format!("{} is not a URL, cannot revalidate", key)),
    }
  }

  fn delete_selected(&mut self) {
    if let Some(key) = self.selected_key().map(String::from) {
      self.cache.delete(&key);
      self.status = Some(format!("Deleted {}", key));
      self.refresh_keys();
    }
  }

  fn refresh_keys(&mut self) {
    let memory = self.lifecycle.synchronizer().memory();
    self.keys = memory.keys();
    ui::ensure_valid_selection(&mut self.list_state, self.keys.len());
  }

  fn move_selection(&mut self, delta: i32) {
    let len = self.keys.len();
    if len > 0 {
      let selected = self.list_state.selected().unwrap_or(0);
      let next = (selected as i32 + delta).rem_euclid(len as i32) as usize;
      self.list_state.select(Some(next));
    }
  }

  // Accessors for UI rendering
  pub fn title(&self) -> &str {
    self.config.title.as_deref().unwrap_or("rehydrate")
  }

  pub fn keys(&self) -> &[String] {
    &self.keys
  }

  pub fn list_state_mut(&mut self) -> &mut ListState {
    &mut self.list_state
  }

  pub fn selected_key(&self) -> Option<&str> {
    self
      .list_state
      .selected()
      .and_then(|i| self.keys.get(i))
      .map(String::as_str)
  }

  pub fn selected_entry(&self) -> Option<CacheEntry> {
    self.selected_key().and_then(|k| self.cache.get(k))
  }

  pub fn is_in_flight(&self, key: &str) -> bool {
    self.in_flight.contains(key)
  }

  pub fn mode(&self) -> &Mode {
    &self.mode
  }

  pub fn prompt(&self) -> &Prompt {
    &self.prompt
  }

  pub fn status(&self) -> Option<&str> {
    self.status.as_deref()
  }

  pub fn app_state(&self) -> AppState {
    self.lifecycle.state()
  }

  pub fn last_report(&self) -> Option<SyncReport> {
    self.reports.borrow().clone()
  }

  pub fn store_location(&self) -> String {
    self.lifecycle.synchronizer().store_location()
  }

  pub fn autocomplete_suggestions(&self) -> Vec<&'static Command> {
    commands::get_suggestions(self.prompt.value())
  }

  pub fn selected_suggestion(&self) -> usize {
    self.selected_suggestion
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;
  use rehydrate::cache::{FileStore, MemoryTier, Synchronizer};
  use serde_json::json;
  use std::sync::Arc;
  use tempfile::TempDir;

  fn app_with_store(dir: &TempDir) -> (App, Arc<MemoryTier>) {
    let store = Arc::new(FileStore::open(dir.path(), "cache").unwrap());
    let memory = Arc::new(MemoryTier::new());
    let sync = Arc::new(Synchronizer::new(memory.clone(), store));
    let app = App::new(
      Config::default(),
      CacheLayer::new(memory.clone()),
      LifecycleObserver::new(sync),
    )
    .unwrap();
    (app, memory)
  }

  #[tokio::test]
  async fn test_shutdown_persists_even_if_terminal_restore_fails() {
    let dir = TempDir::new().unwrap();
    let (mut app, memory) = app_with_store(&dir);
    app.lifecycle.on_foreground().await;
    memory.set("k", CacheEntry::new(json!(1)));

    let result = app.shutdown(Ok(()), Err(eyre!("raw mode stuck"))).await;

    assert!(result.is_err());
    assert_eq!(app.app_state(), AppState::Background);
    assert!(matches!(
      app.last_report(),
      Some(SyncReport::Persisted { entries: 1, .. })
    ));
    assert!(dir.path().join("cache.snapshot").exists());
  }

  #[tokio::test]
  async fn test_loop_error_wins_over_restore_error() {
    let dir = TempDir::new().unwrap();
    let (mut app, _memory) = app_with_store(&dir);
    app.lifecycle.on_foreground().await;

    let err = app
      .shutdown(Err(eyre!("draw failed")), Err(eyre!("raw mode stuck")))
      .await
      .unwrap_err();
    assert!(err.to_string().contains("draw failed"));
  }
}
