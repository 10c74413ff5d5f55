mod format;
pub mod prompt;

use crate::app::{App, Mode};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use rehydrate::lifecycle::AppState;

pub use format::format_age;
use format::{report_color, truncate};

/// Keep a list selection inside `len` items
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  match state.selected() {
    _ if len == 0 => state.select(None),
    None => state.select(Some(0)),
    Some(i) if i >= len => state.select(Some(len - 1)),
    Some(_) => {}
  }
}

/// Main draw function
pub fn draw(frame: &mut Frame, app: &mut App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Status bar
    ])
    .split(frame.area());

  draw_header(frame, chunks[0], app);

  let body = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
    .split(chunks[1]);

  draw_entry_list(frame, body[0], app);
  draw_entry_detail(frame, body[1], app);
  draw_status_bar(frame, chunks[2], app);

  if *app.mode() == Mode::Command {
    draw_command_overlay(frame, chunks[1], app);
  }
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
  let (state_label, state_color) = match app.app_state() {
    AppState::Active => ("ACTIVE", Color::Green),
    AppState::Background => ("BACKGROUND", Color::DarkGray),
  };

  let line = Line::from(vec![
    Span::styled(format!(" {} ", app.title()), Style::default().fg(Color::Cyan).bold()),
    Span::styled(format!("[{}] ", state_label), Style::default().fg(state_color)),
    Span::styled(
      format!("durable: {}", app.store_location()),
      Style::default().fg(Color::DarkGray),
    ),
  ]);
  frame.render_widget(Paragraph::new(line), area);
}

fn draw_entry_list(frame: &mut Frame, area: Rect, app: &mut App) {
  let width = area.width.saturating_sub(10) as usize;
  let items: Vec<ListItem> = app
    .keys()
    .iter()
    .map(|key| {
      let marker = if app.is_in_flight(key) { "~ " } else { "  " };
      ListItem::new(format!("{}{}", marker, truncate(key, width)))
    })
    .collect();

  let block = Block::default()
    .title(format!(" Entries ({}) ", items.len()))
    .title_alignment(Alignment::Center)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if items.is_empty() {
    let paragraph = Paragraph::new("Cache is empty. Press 'o' to fetch a URL.")
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let list = List::new(items)
    .block(block)
    .highlight_style(Style::default().bg(Color::DarkGray).bold())
    .highlight_symbol("> ");

  frame.render_stateful_widget(list, area, app.list_state_mut());
}

fn draw_entry_detail(frame: &mut Frame, area: Rect, app: &App) {
  let block = Block::default()
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  let Some(entry) = app.selected_entry() else {
    frame.render_widget(block.title(" Detail "), area);
    return;
  };

  let title = format!(" cached {} ago ", format_age(entry.age()));
  let body = serde_json::to_string_pretty(&entry.data).unwrap_or_else(|_| entry.data.to_string());

  let paragraph = Paragraph::new(body)
    .block(block.title(title))
    .wrap(Wrap { trim: false });
  frame.render_widget(paragraph, area);
}

fn draw_status_bar(frame: &mut Frame, area: Rect, app: &App) {
  let left = match app.mode() {
    Mode::Normal => Span::styled(
      app
        .status()
        .map(String::from)
        .unwrap_or_else(|| " o:open  r:revalidate  d:delete  b/f:bg/fg  :command  q:quit".to_string()),
      Style::default().fg(Color::DarkGray),
    ),
    Mode::Command => Span::styled(
      format!(":{}", app.prompt().value()),
      Style::default().fg(Color::Yellow),
    ),
    Mode::Open => Span::styled(
      format!("open: {}_", app.prompt().value()),
      Style::default().fg(Color::Cyan),
    ),
  };

  let chunks = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Min(1), Constraint::Length(48)])
    .split(area);

  frame.render_widget(Paragraph::new(Line::from(left)), chunks[0]);

  if let Some(report) = app.last_report() {
    let text = truncate(&report.to_string(), 47);
    let paragraph = Paragraph::new(text)
      .style(Style::default().fg(report_color(&report)))
      .alignment(Alignment::Right);
    frame.render_widget(paragraph, chunks[1]);
  }
}

fn draw_command_overlay(frame: &mut Frame, area: Rect, app: &App) {
  let suggestions = app.autocomplete_suggestions();

  let width = (area.width * 60 / 100).clamp(30, 60).min(area.width);
  let height = (3 + suggestions.len().min(8) as u16).min(area.height);
  let overlay_area = Rect::new(area.x + 1, area.y + 1, width.saturating_sub(1), height);

  frame.render_widget(Clear, overlay_area);

  let block = Block::default()
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Yellow))
    .title(" Command ");
  let inner = block.inner(overlay_area);
  frame.render_widget(block, overlay_area);

  if inner.height == 0 {
    return;
  }

  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([Constraint::Length(1), Constraint::Min(0)])
    .split(inner);

  let input_line = Line::from(vec![
    Span::styled(":", Style::default().fg(Color::Yellow)),
    Span::raw(app.prompt().value().to_string()),
    Span::styled("_", Style::default().fg(Color::Yellow)),
  ]);
  frame.render_widget(Paragraph::new(input_line), chunks[0]);

  if suggestions.is_empty() || chunks[1].height == 0 {
    return;
  }

  let items: Vec<ListItem> = suggestions
    .iter()
    .take(8)
    .map(|cmd| {
      ListItem::new(Line::from(vec![
        Span::styled(format!("{:<12}", cmd.name), Style::default().fg(Color::Cyan)),
        Span::styled(cmd.description, Style::default().fg(Color::DarkGray)),
      ]))
    })
    .collect();

  let mut state = ListState::default().with_selected(Some(app.selected_suggestion()));
  let list = List::new(items).highlight_style(Style::default().bg(Color::DarkGray));
  frame.render_stateful_widget(list, chunks[1], &mut state);
}
