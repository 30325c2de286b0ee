use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, LineGauge, Paragraph, Widget},
};

use capacity::matching::{dice::pips, RodFigure};
use capacity::session::StimulusView;

const PIP: &str = "●";

/// Text rendering of a die face, three rows of `● · ●`.
pub fn dice_lines(value: u8) -> Vec<String> {
    pips(value)
        .iter()
        .map(|row| {
            row.iter()
                .map(|&on| if on { PIP } else { " " })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

/// Text rendering of a rod figure on its 3x3 point grid.
///
/// Points sit every 4 columns and every 2 rows; strokes fill the gaps.
pub fn rod_lines(figure: RodFigure) -> Vec<String> {
    let mut lines = Vec::with_capacity(5);
    for row in 0..3 {
        let mut points = String::new();
        for col in 0..3 {
            points.push('·');
            if col < 2 {
                points.push_str(if figure.horizontal(row, col) { "───" } else { "   " });
            }
        }
        lines.push(points);

        if row < 2 {
            let mut strokes = String::new();
            for col in 0..3 {
                strokes.push(if figure.vertical(row, col) { '│' } else { ' ' });
                if col < 2 {
                    strokes.push_str("   ");
                }
            }
            lines.push(strokes);
        }
    }
    lines
}

fn figure(title: &str, lines: Vec<String>, style: Style) -> Paragraph<'static> {
    let text: Vec<Line> = lines
        .into_iter()
        .map(|l| Line::from(Span::styled(l, style)))
        .collect();
    Paragraph::new(text)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
}

/// The matching-task panel: the two figures being compared and the trial timer.
pub struct StimulusPanel {
    pub stimulus: StimulusView,
    pub progress: f64,
}

impl Widget for StimulusPanel {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let live = bold.fg(Color::White);
        let done = Style::default().add_modifier(Modifier::DIM);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(7),
                Constraint::Length(7),
                Constraint::Length(1),
                Constraint::Min(0),
            ])
            .split(area);

        match self.stimulus {
            StimulusView::None => {}
            StimulusView::DiceReference(value) => {
                figure("reference", dice_lines(value), bold.fg(Color::Cyan)).render(chunks[0], buf);
                Paragraph::new(Span::styled(
                    "remember this face",
                    Style::default().add_modifier(Modifier::ITALIC),
                ))
                .alignment(Alignment::Center)
                .render(chunks[1], buf);
            }
            StimulusView::Dice {
                reference,
                current,
                resolved,
            } => {
                let style = if resolved { done } else { live };
                figure("reference", dice_lines(reference), done).render(chunks[0], buf);
                figure("now", dice_lines(current), style).render(chunks[1], buf);
            }
            StimulusView::Rod {
                top,
                bottom,
                resolved,
            } => {
                let style = if resolved { done } else { live };
                figure("top", rod_lines(top), style).render(chunks[0], buf);
                figure("bottom", rod_lines(bottom), style).render(chunks[1], buf);
            }
        }

        if !matches!(self.stimulus, StimulusView::None | StimulusView::DiceReference(_)) {
            LineGauge::default()
                .filled_style(Style::default().fg(Color::Magenta))
                .ratio(self.progress.clamp(0.0, 1.0))
                .label("")
                .render(chunks[2], buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dice_faces_show_their_pips() {
        for value in 1..=6u8 {
            let count: usize = dice_lines(value)
                .iter()
                .map(|l| l.matches(PIP).count())
                .sum();
            assert_eq!(count, value as usize);
        }
    }

    #[test]
    fn empty_rod_figure_is_only_points() {
        let lines = rod_lines(RodFigure::from_bits(0));
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "·   ·   ·");
        assert_eq!(lines[1].trim(), "");
    }

    #[test]
    fn full_rod_figure_draws_every_stroke() {
        let lines = rod_lines(RodFigure::from_bits(0x0FFF));
        assert_eq!(lines[0], "·───·───·");
        assert_eq!(lines[1], "│   │   │");
        assert_eq!(lines[4], "·───·───·");
    }

    #[test]
    fn vertical_strokes_land_in_their_column() {
        // Vertical edge row 1, column 2.
        let lines = rod_lines(RodFigure::from_bits(1 << (6 + 3 + 2)));
        assert_eq!(lines[3], "        │");
        assert_eq!(lines[1].trim(), "");
    }
}
