use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame, Terminal,
};
use std::io;

use super::types::Session;

/// Show a selection UI for choosing a session to resume
pub fn select_session(sessions: Vec<Session>) -> Result<Option<Session>> {
    if sessions.is_empty() {
        println!("No sessions found for this assistant.");
        return Ok(None);
    }

    // If there's only one session, return it directly
    if sessions.len() == 1 {
        return Ok(sessions.into_iter().next());
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut picker = SessionPicker::new(sessions);
    let result = run_picker(&mut terminal, &mut picker);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Cursor over a non-empty session list
struct SessionPicker {
    sessions: Vec<Session>,
    selected: usize,
}

impl SessionPicker {
    fn new(sessions: Vec<Session>) -> Self {
        Self {
            sessions,
            selected: 0,
        }
    }

    fn down(&mut self) {
        if self.selected + 1 < self.sessions.len() {
            self.selected += 1;
        }
    }

    fn up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    fn first(&mut self) {
        self.selected = 0;
    }

    fn last(&mut self) {
        self.selected = self.sessions.len().saturating_sub(1);
    }

    fn current(&self) -> Option<Session> {
        self.sessions.get(self.selected).cloned()
    }
}

fn run_picker(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    picker: &mut SessionPicker,
) -> Result<Option<Session>> {
    loop {
        terminal.draw(|f| render_picker(f, picker))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(None),
                KeyCode::Enter => return Ok(picker.current()),
                KeyCode::Down | KeyCode::Char('j') => picker.down(),
                KeyCode::Up | KeyCode::Char('k') => picker.up(),
                KeyCode::Home => picker.first(),
                KeyCode::End => picker.last(),
                _ => {}
            }
        }
    }
}

fn render_picker(f: &mut Frame, picker: &SessionPicker) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(f.area());

    let title = Paragraph::new("Select a session to resume")
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL).title(" threadline - Resume Session "));
    f.render_widget(title, chunks[0]);

    let items: Vec<ListItem> = picker
        .sessions
        .iter()
        .enumerate()
        .map(|(i, session)| {
            let style = if i == picker.selected {
                Style::default()
                    .bg(Color::Blue)
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };

            let created = session
                .created_at
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "unknown date".to_string());

            ListItem::new(vec![
                Line::from(Span::styled(session.display_name(), style)),
                Line::from(Span::styled(
                    format!("  {} | id: {}", created, session.id),
                    style.fg(Color::Gray),
                )),
            ])
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Sessions "),
    );
    f.render_widget(list, chunks[1]);

    let help = vec![Line::from(vec![
        Span::raw("Up/k: Up  Down/j: Down  "),
        Span::styled("Enter", Style::default().fg(Color::Green)),
        Span::raw(": Select  "),
        Span::styled("q/Esc", Style::default().fg(Color::Red)),
        Span::raw(": Cancel"),
    ])];
    let help_widget = Paragraph::new(help)
        .style(Style::default().fg(Color::DarkGray))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(help_widget, chunks[2]);
}
