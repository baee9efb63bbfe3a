use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, BorderType, Borders, Cell, Clear, Gauge, Padding, Paragraph, Row, Table, Wrap,
};

use super::super::episode::{
    EpisodeListing, EpisodeRow, format_timestamp, format_updated_at, truncate,
};
use super::{Dashboard, EpisodePanel, PlayerLine, TuiAction};

const ACCENT: Color = Color::Rgb(110, 170, 255);
const MUTED: Color = Color::Rgb(185, 195, 210);
const TEXT: Color = Color::Rgb(230, 235, 242);

pub(super) fn draw_tui(
    frame: &mut Frame,
    dashboard: &mut Dashboard,
    episode_rows: &[EpisodeRow],
    player: &PlayerLine,
    on_watchlist: bool,
) {
    let bg = Block::default().style(Style::default().bg(Color::Black));
    frame.render_widget(bg, frame.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], dashboard);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(64), Constraint::Percentage(36)])
        .split(chunks[1]);

    if let Some(panel) = dashboard.episodes.as_mut() {
        render_episode_table(frame, body[0], panel, episode_rows);
        render_season_list(frame, body[1], panel);
    } else {
        render_library(frame, body[0], dashboard);
        render_selection(frame, body[1], dashboard, on_watchlist);
    }

    let player_widget = Paragraph::new(Line::from(vec![
        Span::styled(format!(" {} ", player.state), player_state_style(player.state)),
        Span::raw("  "),
        Span::styled(player.text.clone(), Style::default().fg(TEXT)),
    ]))
    .block(panel_block("Player"));
    frame.render_widget(player_widget, chunks[2]);

    let controls = Paragraph::new(controls_line(dashboard))
        .alignment(Alignment::Center)
        .block(panel_block("Controls"));
    frame.render_widget(controls, chunks[3]);

    let status_widget = Paragraph::new(dashboard.status.clone())
        .style(status_style(&dashboard.status))
        .block(panel_block("Status"));
    frame.render_widget(status_widget, chunks[4]);

    if let Some(confirm) = dashboard.pending_delete.as_ref() {
        let popup_text = format!(
            "Remove from continue watching?\n\n{}\n\nSaved progress is deleted.\n\n[y / Enter] Remove   [n / Esc] Cancel",
            truncate(&confirm.title, 56)
        );
        render_popup(frame, "Confirm Remove", &popup_text);
    } else if let Some(notice) = dashboard.pending_notice.as_ref() {
        render_popup(frame, notice.heading, &notice.message);
    }
}

fn render_header(frame: &mut Frame, area: Rect, dashboard: &Dashboard) {
    let selected = dashboard
        .table_state
        .selected()
        .map(|idx| (idx + 1).to_string())
        .unwrap_or_else(|| "-".to_string());
    let mode = if dashboard.episodes.is_some() {
        "EPISODES"
    } else {
        dashboard.action.label()
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "STREAMTRACK",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::raw("   "),
        Span::styled(
            format!("{} in progress", dashboard.cards.len()),
            Style::default().fg(MUTED),
        ),
        Span::raw("   "),
        Span::styled(format!("selected {selected}"), Style::default().fg(MUTED)),
        Span::raw("   "),
        Span::styled(mode, Style::default().fg(Color::Yellow)),
    ]))
    .alignment(Alignment::Center)
    .block(panel_block("Dashboard"));
    frame.render_widget(header, area);
}

fn render_library(frame: &mut Frame, area: Rect, dashboard: &mut Dashboard) {
    let rows: Vec<Row> = dashboard
        .cards
        .iter()
        .map(|card| {
            Row::new(vec![
                Cell::from(dashboard.card_title(card)),
                Cell::from(card.key().kind.label()),
                Cell::from(card.episode_label().unwrap_or_else(|| "-".to_string())),
                Cell::from(format!("{:.0}%", card.percent)),
                Cell::from(format_updated_at(card.entry.updated_at)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(42),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(6),
            Constraint::Length(17),
        ],
    )
    .header(
        Row::new(vec!["Title", "Kind", "Episode", "Done", "Updated"])
            .style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
    )
    .block(panel_block("Continue Watching"))
    .row_highlight_style(highlight_style())
    .highlight_symbol("▸ ");
    frame.render_stateful_widget(table, area, &mut dashboard.table_state);
}

fn render_selection(frame: &mut Frame, area: Rect, dashboard: &Dashboard, on_watchlist: bool) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(3)])
        .split(area);

    let Some(card) = dashboard.selected_card() else {
        let empty = Paragraph::new(
            "Nothing to continue yet.\n\nPlay something with `streamtrack play`, then come back here.",
        )
        .style(Style::default().fg(TEXT))
        .wrap(Wrap { trim: true })
        .block(panel_block("Selected"));
        frame.render_widget(empty, parts[0]);
        return;
    };

    let position = if card.entry.duration_seconds > 0.0 {
        format!(
            "{} of {}",
            format_timestamp(card.entry.progress_seconds),
            format_timestamp(card.entry.duration_seconds)
        )
    } else {
        format_timestamp(card.entry.progress_seconds)
    };
    let mut text = format!(
        "Title\n{}\n\nKind\n{}\n\nPosition\n{}\n\nId\n{}\n\nWatchlist\n{}",
        truncate(&dashboard.card_title(card), 40),
        card.key().kind.label(),
        position,
        truncate(&card.key().id, 28),
        if on_watchlist { "yes" } else { "no" },
    );
    if let Some(episode) = card.episode_label() {
        text.push_str(&format!("\n\nEpisode\n{episode}"));
    }
    if dashboard.details_loading(card) {
        text.push_str("\n\nLoading details...");
    }
    let selection = Paragraph::new(text)
        .style(Style::default().fg(TEXT))
        .block(panel_block("Selected"));
    frame.render_widget(selection, parts[0]);

    let gauge = Gauge::default()
        .block(panel_block("Progress"))
        .gauge_style(
            Style::default()
                .fg(Color::Rgb(130, 190, 255))
                .bg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .label(format!("{:.0}%", card.percent))
        .ratio((card.percent / 100.0).clamp(0.0, 1.0));
    frame.render_widget(gauge, parts[1]);
}

fn render_episode_table(
    frame: &mut Frame,
    area: Rect,
    panel: &mut EpisodePanel,
    episode_rows: &[EpisodeRow],
) {
    let season = panel
        .navigator
        .as_ref()
        .and_then(|navigator| navigator.selected_season());
    let title = match season {
        Some(season) => format!("{} · Season {season}", truncate(&panel.title, 40)),
        None => truncate(&panel.title, 40),
    };

    let placeholder = match panel.navigator.as_ref().map(|navigator| navigator.listing()) {
        None | Some(EpisodeListing::Loading) | Some(EpisodeListing::NotLoaded) => {
            Some("Loading episodes...")
        }
        Some(EpisodeListing::Unavailable) => Some("Episodes are unavailable right now."),
        Some(EpisodeListing::Loaded(episodes)) if episodes.is_empty() => {
            Some("This season lists no episodes.")
        }
        Some(EpisodeListing::Loaded(_)) => None,
    };
    if let Some(message) = placeholder {
        let widget = Paragraph::new(message)
            .style(Style::default().fg(MUTED))
            .block(panel_block(title));
        frame.render_widget(widget, area);
        return;
    }

    let rows: Vec<Row> = episode_rows
        .iter()
        .map(|row| {
            Row::new(vec![
                Cell::from(row.episode.number.to_string()),
                Cell::from(row.episode.name.clone()),
                Cell::from(
                    row.episode
                        .runtime_minutes
                        .map(|minutes| format!("{minutes}m"))
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Cell::from(row.resume_badge().unwrap_or_default()),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Percentage(60),
            Constraint::Length(6),
            Constraint::Length(9),
        ],
    )
    .header(
        Row::new(vec!["#", "Episode", "Length", "Resume"])
            .style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
    )
    .block(panel_block(title))
    .row_highlight_style(highlight_style())
    .highlight_symbol("▸ ");
    frame.render_stateful_widget(table, area, &mut panel.table_state);
}

fn render_season_list(frame: &mut Frame, area: Rect, panel: &EpisodePanel) {
    let Some(navigator) = panel.navigator.as_ref() else {
        let widget = Paragraph::new("Loading seasons...")
            .style(Style::default().fg(MUTED))
            .block(panel_block("Seasons"));
        frame.render_widget(widget, area);
        return;
    };

    let selected = navigator.selected_season();
    let lines: Vec<Line> = if navigator.seasons().is_empty() {
        vec![Line::from("No seasons listed.")]
    } else {
        navigator
            .seasons()
            .iter()
            .map(|season| {
                let count = season
                    .episode_count
                    .map(|count| format!("  ({count})"))
                    .unwrap_or_default();
                let text = format!(" {} {}{count} ", season.number, season.name);
                if Some(season.number) == selected {
                    Line::from(Span::styled(text, highlight_style()))
                } else {
                    Line::from(Span::styled(text, Style::default().fg(TEXT)))
                }
            })
            .collect()
    };
    let widget = Paragraph::new(lines).block(panel_block("Seasons"));
    frame.render_widget(widget, area);
}

fn controls_line(dashboard: &Dashboard) -> Line<'static> {
    if dashboard.episodes.is_some() {
        return Line::from(Span::styled(
            "↑/↓ episode  ←/→ season  Enter play  p provider  x stop  Esc back  q quit",
            Style::default().fg(MUTED),
        ));
    }

    let mut spans = Vec::new();
    for action in TuiAction::ALL {
        spans.push(Span::styled(
            format!(" {} ", action.label()),
            action_pill_style(action, dashboard.action),
        ));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(
        "  ↑/↓ move  ←/→ action  Enter run  x stop  w watchlist  d remove  r refresh  q quit",
        Style::default().fg(MUTED),
    ));
    Line::from(spans)
}

fn panel_block<'a>(title: impl Into<Line<'a>>) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Rgb(125, 135, 150)))
        .title(title)
}

fn modal_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(
            Style::default()
                .fg(Color::Rgb(160, 190, 235))
                .add_modifier(Modifier::BOLD),
        )
        .title(title)
        .padding(Padding::new(2, 2, 1, 1))
}

fn highlight_style() -> Style {
    Style::default()
        .bg(ACCENT)
        .fg(Color::Black)
        .add_modifier(Modifier::BOLD)
}

fn action_pill_style(action: TuiAction, current: TuiAction) -> Style {
    if action == current {
        highlight_style()
    } else {
        Style::default().bg(Color::Rgb(72, 82, 96)).fg(TEXT)
    }
}

fn player_state_style(state: &str) -> Style {
    let color = match state {
        "PLAYING" => Color::Rgb(120, 220, 150),
        "LOADING" => Color::Yellow,
        "FAILED" => Color::Rgb(255, 145, 120),
        _ => Color::Rgb(72, 82, 96),
    };
    Style::default()
        .bg(color)
        .fg(Color::Black)
        .add_modifier(Modifier::BOLD)
}

fn status_style(status: &str) -> Style {
    if status.starts_with("ERROR:") {
        Style::default()
            .fg(Color::Rgb(255, 145, 120))
            .add_modifier(Modifier::BOLD)
    } else if status.starts_with("INFO:") {
        Style::default().fg(Color::Rgb(205, 165, 255))
    } else {
        Style::default().fg(TEXT)
    }
}

fn render_popup(frame: &mut Frame, heading: &'static str, text: &str) {
    let area = popup_rect_for_text(frame.area(), text);
    render_popup_shadow(frame, area);
    frame.render_widget(Clear, area);
    let popup = Paragraph::new(text.to_string())
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(modal_block(heading));
    frame.render_widget(popup, area);
}

fn centered_fixed_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width.max(1));
    let height = height.min(area.height.max(1));
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width, height)
}

fn render_popup_shadow(frame: &mut Frame, popup_area: Rect) {
    let area = frame.area();
    let shadow = Rect::new(
        (popup_area.x + 1).min(area.x + area.width.saturating_sub(1)),
        (popup_area.y + 1).min(area.y + area.height.saturating_sub(1)),
        popup_area.width.saturating_sub(1),
        popup_area.height.saturating_sub(1),
    );
    if shadow.width == 0 || shadow.height == 0 {
        return;
    }
    frame.render_widget(
        Block::default().style(Style::default().bg(Color::Rgb(14, 16, 24))),
        shadow,
    );
}

fn popup_rect_for_text(area: Rect, text: &str) -> Rect {
    let widest = text
        .lines()
        .map(|line| line.chars().count() as u16)
        .max()
        .unwrap_or(0);
    let line_count = text.lines().count() as u16;

    let available_width = area.width.saturating_sub(2).max(1);
    let width = widest
        .saturating_add(12)
        .clamp(48.min(available_width), 72.min(available_width));

    let available_height = area.height.saturating_sub(2).max(1);
    let height = line_count
        .saturating_add(6)
        .clamp(10.min(available_height), 18.min(available_height));

    centered_fixed_rect(width, height, area)
}
