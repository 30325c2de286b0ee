use itertools::Itertools;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Clear, Dataset, GraphType, Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use capacity::matching::TaskStats;
use capacity::session::Phase;
use capacity::stats::PersistOutcome;

use crate::ui::charting::{format_clock, history_points};
use crate::ui::field::FlightField;
use crate::ui::stimulus::StimulusPanel;
use crate::App;

const HORIZONTAL_MARGIN: u16 = 2;

/// A UI Screen boundary: one per session phase group.
pub trait Screen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer);
}

/// Helper to construct the appropriate screen for the current phase
pub fn current_screen(phase: Phase) -> Box<dyn Screen> {
    match phase {
        Phase::Menu => Box::new(MenuScreen),
        Phase::Reference | Phase::Running => Box::new(PlayScreen),
        Phase::Finished => Box::new(SummaryScreen),
    }
}

fn legend(text: &str) -> Paragraph<'_> {
    Paragraph::new(Span::styled(
        text,
        Style::default().add_modifier(Modifier::ITALIC),
    ))
}

/// A `width` x `height` rect centered in `area`, shrunk to fit.
fn centered(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn overlay(message: &str, style: Style, area: Rect, buf: &mut Buffer) {
    let rect = centered(message.width() as u16 + 4, 3, area);
    Clear.render(rect, buf);
    Paragraph::new(Span::styled(message, style))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL))
        .render(rect, buf);
}

fn halt_overlay(app: &App, area: Rect, buf: &mut Buffer) {
    if let Some(err) = app.session.halted() {
        overlay(
            &format!("session halted: {err} (esc for menu)"),
            Style::default().add_modifier(Modifier::BOLD).fg(Color::Red),
            area,
            buf,
        );
    }
}

fn task_line(name: &str, stats: TaskStats) -> String {
    format!(
        "{name:<5} hits {}   targets {}   false alarms {}",
        stats.hits, stats.targets, stats.fails
    )
}

pub struct MenuScreen;

impl Screen for MenuScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let config = app.session.config();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(1)
            .constraints([
                Constraint::Length(2),
                Constraint::Min(1),
                Constraint::Length(1),
            ])
            .split(area);

        Paragraph::new(Line::from(vec![
            Span::styled("capacity", bold.fg(Color::Cyan)),
            Span::raw("  dual-task trainer"),
        ]))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);

        let mut lines = vec![
            Line::from("Steer the plane between the gate posts."),
            Line::from("Press fire whenever the two figures match."),
            Line::from("The first half compares dice, the second half rods."),
            Line::from(""),
            Line::from(Span::styled(
                [
                    format!("session {}", format_clock(config.session_duration_ms as f64)),
                    format!(
                        "stimulus every {:.1}s",
                        config.task_change_interval_ms as f64 / 1000.0
                    ),
                    format!("gap {:.0}%", config.gap_width_fraction * 100.0),
                ]
                .iter()
                .join("   "),
                Style::default().fg(Color::Gray),
            )),
        ];

        lines.push(match &app.identity {
            Some(player) => Line::from(format!("player: {player}")),
            None => Line::from(Span::styled(
                "guest session, results are not saved",
                Style::default().fg(Color::Yellow),
            )),
        });

        if let Some(summary) = app.session.last_summary() {
            lines.push(Line::from(format!("last score {}", summary.total_score)));
        }
        if let Some(best) = app.best_score {
            lines.push(Line::from(Span::styled(
                format!("personal best {best}"),
                bold,
            )));
        }

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(chunks[1], buf);

        legend("(enter) start / (esc) quit").render(chunks[2], buf);
    }
}

pub struct PlayScreen;

impl Screen for PlayScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        let snap = app.session.snapshot();
        let bold = Style::default().add_modifier(Modifier::BOLD);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(8),
                Constraint::Length(1),
            ])
            .split(area);

        let status = if snap.phase == Phase::Reference {
            format!(
                "get ready {:.1}s",
                snap.reference_remaining_ms.max(0.0) / 1000.0
            )
        } else {
            [
                format!("{} task", snap.active_task),
                format_clock(snap.remaining_ms),
                format!("score {}", snap.dice_stats.hits + snap.rod_stats.hits),
                format!("flight fails {}/{}", snap.flight_fails, snap.total_obstacles),
            ]
            .iter()
            .join("   ")
        };
        Paragraph::new(Span::styled(status, bold))
            .alignment(Alignment::Center)
            .render(rows[0], buf);

        let main = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Min(24)])
            .split(rows[1]);

        FlightField {
            plane: snap.plane,
            obstacles: snap.obstacles,
            alert: app.alert.as_ref().map(|a| a.label()),
        }
        .render(main[0], buf);

        StimulusPanel {
            stimulus: snap.stimulus,
            progress: snap.trial_progress,
        }
        .render(main[1], buf);

        legend("(←/→) steer / (space) fire / (p)ause / (esc) menu").render(rows[2], buf);

        if app.session.halted().is_some() {
            halt_overlay(app, area, buf);
        } else if snap.paused {
            overlay("PAUSED (p to resume)", bold.fg(Color::Yellow), area, buf);
        }
    }
}

pub struct SummaryScreen;

impl Screen for SummaryScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        let bold = Style::default().add_modifier(Modifier::BOLD);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(1)
            .constraints([
                Constraint::Length(7),
                Constraint::Min(3),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(area);

        let Some(summary) = app.session.last_summary() else {
            legend("(r) menu / (esc) menu").render(chunks[3], buf);
            halt_overlay(app, area, buf);
            return;
        };

        let mut lines = vec![
            Line::from(Span::styled(
                format!("score {}", summary.total_score),
                bold.fg(Color::Green),
            )),
            Line::from(
                [
                    format!("{:.0}s", summary.duration_seconds),
                    format!(
                        "flight fails {}/{}",
                        summary.flight_fails, summary.total_obstacles_encountered
                    ),
                ]
                .iter()
                .join("   "),
            ),
            Line::from(task_line("dice", summary.dice_stats)),
            Line::from(task_line("rod", summary.rod_stats)),
        ];
        if let Some(best) = app.best_score {
            let stored = app.last_persist == Some(PersistOutcome::Stored);
            let marker = if stored && summary.total_score >= best {
                "  new best!"
            } else {
                ""
            };
            lines.push(Line::from(Span::styled(
                format!("personal best {best}{marker}"),
                bold,
            )));
        }
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .render(chunks[0], buf);

        if app.history.len() > 1 {
            let (points, highest) = history_points(&app.history);
            let datasets = vec![Dataset::default()
                .marker(Marker::Braille)
                .style(Style::default().fg(Color::Magenta))
                .graph_type(GraphType::Line)
                .data(&points)];
            Chart::new(datasets)
                .x_axis(
                    Axis::default()
                        .title("session")
                        .bounds([1.0, points.len() as f64])
                        .labels(vec![
                            Span::styled("1", bold),
                            Span::styled(points.len().to_string(), bold),
                        ]),
                )
                .y_axis(
                    Axis::default()
                        .title("score")
                        .bounds([0.0, highest])
                        .labels(vec![
                            Span::styled("0", bold),
                            Span::styled(format!("{highest:.0}"), bold),
                        ]),
                )
                .render(chunks[1], buf);
        }

        let saved = match app.last_persist {
            Some(PersistOutcome::Stored) => "saved to history",
            Some(PersistOutcome::SkippedAnonymous) => "guest session, not saved",
            Some(PersistOutcome::Failed) => "could not save this session, see the log",
            None => "",
        };
        Paragraph::new(Span::styled(
            saved,
            Style::default().add_modifier(Modifier::DIM),
        ))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

        legend("(r) menu / (esc) menu").render(chunks[3], buf);
        halt_overlay(app, area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_rect_fits_inside() {
        let area = Rect::new(0, 0, 10, 4);
        let r = centered(20, 3, area);
        assert_eq!(r.width, 10);
        assert_eq!(r.height, 3);
        assert_eq!(r.y, 0);

        let r = centered(4, 2, Rect::new(2, 2, 10, 10));
        assert_eq!((r.x, r.y), (5, 6));
    }

    #[test]
    fn task_line_lists_counters() {
        let line = task_line(
            "dice",
            TaskStats {
                hits: 3,
                targets: 5,
                fails: 1,
            },
        );
        assert_eq!(line, "dice  hits 3   targets 5   false alarms 1");
    }
}
