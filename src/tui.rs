use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;

use crate::api::ApiClient;
use crate::board::{move_card_with, Board, MoveOutcome};
use crate::error::ApiError;
use crate::models::{ApplicationStatus, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoticeKind {
    Info,
    Success,
    Error,
}

/// One-line transient notification; cleared on the next key press.
#[derive(Debug, Clone)]
struct Notice {
    text: String,
    kind: NoticeKind,
}

impl Notice {
    fn info(text: impl Into<String>) -> Self {
        Self { text: text.into(), kind: NoticeKind::Info }
    }

    fn success(text: impl Into<String>) -> Self {
        Self { text: text.into(), kind: NoticeKind::Success }
    }

    fn error(text: impl Into<String>) -> Self {
        Self { text: text.into(), kind: NoticeKind::Error }
    }
}

struct ViewState {
    board: Board,
    notice: Option<Notice>,
}

pub fn run_board(client: &ApiClient) -> Result<()> {
    let apps = client.list_applications()?;
    let mut state = ViewState {
        board: Board::new(apps),
        notice: None,
    };

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, client);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut ViewState,
    client: &ApiClient,
) -> Result<()> {
    loop {
        terminal.draw(|frame| draw(frame, &state.board, state.notice.as_ref()))?;

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        state.notice = None;

        let target = match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Left | KeyCode::Char('h') => {
                state.board.left();
                None
            }
            KeyCode::Right | KeyCode::Char('l') => {
                state.board.right();
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                state.board.down();
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                state.board.up();
                None
            }
            KeyCode::Char('r') => {
                reload(state, client)?;
                None
            }
            KeyCode::Char('<') | KeyCode::Char('H') => shifted(state.board.selected_column(), -1),
            KeyCode::Char('>') | KeyCode::Char('L') => shifted(state.board.selected_column(), 1),
            KeyCode::Char(c @ '1'..='7') => {
                let idx = c as usize - '1' as usize;
                Some(ApplicationStatus::ALL[idx])
            }
            _ => None,
        };

        let (Some(target), Some(card)) = (target, state.board.selected()) else {
            continue;
        };
        let id = card.id.clone();
        move_selected(terminal, state, client, &id, target)?;
    }
    Ok(())
}

fn shifted(status: ApplicationStatus, delta: isize) -> Option<ApplicationStatus> {
    let idx = ApplicationStatus::ALL.iter().position(|s| *s == status)?;
    let next = idx.checked_add_signed(delta)?;
    ApplicationStatus::ALL.get(next).copied()
}

fn move_selected(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut ViewState,
    client: &ApiClient,
    id: &RecordId,
    target: ApplicationStatus,
) -> Result<()> {
    let saving = Notice::info(format!("Saving… moving to {}", target.label()));
    let result = move_card_with(
        &mut state.board,
        id,
        target,
        |board| {
            // Render the moved card before the request goes out.
            if let Err(err) = terminal.draw(|frame| draw(frame, board, Some(&saving))) {
                tracing::debug!(error = %err, "could not render pending move");
            }
            client.patch_status(id, target)
        },
        || client.list_applications(),
    );

    state.notice = match result {
        Ok(MoveOutcome::Moved) => Some(Notice::success("Status updated")),
        Ok(MoveOutcome::Unchanged) => None,
        Err(ApiError::Unauthorized) => return Err(ApiError::Unauthorized.into()),
        Err(err) => Some(Notice::error(format!(
            "Could not save status, reverting: {}",
            err.user_message()
        ))),
    };
    Ok(())
}

fn reload(state: &mut ViewState, client: &ApiClient) -> Result<()> {
    match client.list_applications() {
        Ok(apps) => {
            state.board.replace(apps);
            state.notice = Some(Notice::info("Reloaded"));
        }
        Err(ApiError::Unauthorized) => return Err(ApiError::Unauthorized.into()),
        Err(err) => state.notice = Some(Notice::error(err.user_message())),
    }
    Ok(())
}

fn status_style(status: ApplicationStatus) -> Style {
    match status {
        ApplicationStatus::Saved => Style::default().fg(Color::Gray),
        ApplicationStatus::Applied => Style::default().fg(Color::Cyan),
        ApplicationStatus::PhoneScreen => Style::default().fg(Color::Blue),
        ApplicationStatus::Interviewing => Style::default().fg(Color::Yellow),
        ApplicationStatus::Offer => Style::default().fg(Color::Green),
        ApplicationStatus::Accepted => Style::default().fg(Color::LightGreen),
        ApplicationStatus::Rejected => Style::default().fg(Color::Red),
        ApplicationStatus::Unknown => Style::default().fg(Color::DarkGray),
    }
}

fn draw(frame: &mut Frame, board: &Board, notice: Option<&Notice>) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(6),
            Constraint::Length(9),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, ApplicationStatus::ALL.len() as u32); ApplicationStatus::ALL.len()])
        .split(rows[0]);

    for (i, status) in ApplicationStatus::ALL.iter().enumerate() {
        let cards = board.column_cards(*status);
        let items: Vec<ListItem> = if cards.is_empty() {
            vec![ListItem::new(Span::styled(
                "Drop items here",
                Style::default().fg(Color::DarkGray),
            ))]
        } else {
            cards
                .iter()
                .map(|app| {
                    ListItem::new(vec![
                        Line::from(truncate(&app.display_title(), 24)),
                        Line::from(Span::styled(
                            truncate(&app.display_company(), 24),
                            Style::default().fg(Color::DarkGray),
                        )),
                    ])
                })
                .collect()
        };

        let is_selected = *status == board.selected_column();
        let border_style = if is_selected {
            status_style(*status).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(border_style)
                    .title(format!(" {} ({}) ", status.label(), cards.len())),
            )
            .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));

        let mut list_state = ListState::default();
        if is_selected && !cards.is_empty() {
            list_state.select(Some(board.selected_row()));
        }
        frame.render_stateful_widget(list, columns[i], &mut list_state);
    }

    let mut detail_title = " Detail ".to_string();
    let unplaced = board.unplaced();
    if unplaced > 0 {
        detail_title = format!(" Detail · {} with unrecognized status not shown ", unplaced);
    }
    let detail = Paragraph::new(build_detail(board))
        .block(Block::default().borders(Borders::ALL).title(detail_title))
        .wrap(Wrap { trim: false });
    frame.render_widget(detail, rows[1]);

    if let Some(notice) = notice {
        let style = match notice.kind {
            NoticeKind::Info => Style::default().fg(Color::Yellow),
            NoticeKind::Success => Style::default().fg(Color::Green),
            NoticeKind::Error => Style::default().fg(Color::Red),
        };
        frame.render_widget(Paragraph::new(notice.text.as_str()).style(style), rows[2]);
    }

    let help = Paragraph::new(
        " h/l:column  j/k:card  </>:move card  1-7:move to column  r:reload  q:quit",
    )
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, rows[3]);
}

fn build_detail(board: &Board) -> Text<'_> {
    if board.applications().is_empty() {
        return Text::raw("No applications yet. Track one with `jobtrack apps add <job-id>`.");
    }
    let Some(app) = board.selected() else {
        return Text::raw("No application selected");
    };

    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(Span::styled(
        app.display_title(),
        Style::default().add_modifier(Modifier::BOLD),
    )));

    let company = app.display_company();
    if !company.is_empty() {
        lines.push(Line::from(format!("at {}", company)));
    }

    lines.push(Line::from(Span::styled(
        format!("Status: {}", app.status.label()),
        status_style(app.status),
    )));

    if let Some(applied) = &app.applied_date {
        lines.push(Line::from(format!("Applied: {}", applied)));
    }

    if let Some(notes) = app.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        lines.push(Line::from(""));
        for line in textwrap::fill(notes, 90).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
    }

    Text::from(lines)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;

    fn sample_board() -> Board {
        let apps = serde_json::from_value(serde_json::json!([
            {"id": 1, "status": "applied", "title": "Platform Engineer", "company": "Acme"},
            {"id": 2, "status": "offer", "title": "SRE", "notes": "Negotiate start date"},
            {"id": 3, "status": "withdrawn"}
        ]))
        .unwrap();
        Board::new(apps)
    }

    fn render(board: &Board, notice: Option<&Notice>) -> String {
        let mut terminal = Terminal::new(TestBackend::new(200, 30)).unwrap();
        terminal.draw(|frame| draw(frame, board, notice)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_shifted_stays_on_board() {
        assert_eq!(shifted(ApplicationStatus::Saved, -1), None);
        assert_eq!(shifted(ApplicationStatus::Saved, 1), Some(ApplicationStatus::Applied));
        assert_eq!(shifted(ApplicationStatus::Rejected, 1), None);
        assert_eq!(shifted(ApplicationStatus::Offer, -1), Some(ApplicationStatus::Interviewing));
    }

    #[test]
    fn test_draw_shows_columns_counts_and_notice() {
        let board = sample_board();
        let screen = render(&board, Some(&Notice::error("Could not save status, reverting")));
        assert!(screen.contains("Applied (1)"));
        assert!(screen.contains("Offer (1)"));
        assert!(screen.contains("Saved (0)"));
        assert!(screen.contains("Platform Engineer"));
        assert!(screen.contains("1 with unrecognized status not shown"));
        assert!(screen.contains("Could not save status, reverting"));
    }

    #[test]
    fn test_detail_for_selected_card() {
        let mut board = sample_board();
        for _ in 0..4 {
            board.right();
        }
        let screen = render(&board, None);
        assert!(screen.contains("Status: Offer"));
        assert!(screen.contains("Negotiate start date"));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Ingénieur logiciel senior", 10), "Ingénie...");
    }
}
