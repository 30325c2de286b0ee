use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    symbols::Marker,
    widgets::{
        canvas::{Canvas, Circle},
        Block, Borders, Widget,
    },
};

use capacity::flight::{Obstacle, PlaneState, PLANE_RADIUS, PLANE_Y, POST_RADIUS};

/// Map a field y (0 at the top, growing downward) to canvas y (growing upward).
fn canvas_y(field_y: f64) -> f64 {
    1.0 - field_y
}

fn post_color(obstacle: &Obstacle) -> Color {
    if obstacle.hit {
        Color::Red
    } else if obstacle.passed {
        Color::Green
    } else {
        Color::Yellow
    }
}

/// The flight play field drawn on a braille canvas.
pub struct FlightField<'a> {
    pub plane: PlaneState,
    pub obstacles: &'a [Obstacle],
    pub alert: Option<&'a str>,
}

impl Widget for FlightField<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = match self.alert {
            Some(label) => Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red))
                .title(format!(" {label} ")),
            None => Block::default().borders(Borders::ALL),
        };

        Canvas::default()
            .block(block)
            .marker(Marker::Braille)
            .x_bounds([0.0, 1.0])
            .y_bounds([0.0, 1.0])
            .paint(|ctx| {
                for obstacle in self.obstacles {
                    let y = canvas_y(obstacle.vertical_position);
                    if !(0.0..=1.0).contains(&y) {
                        continue;
                    }
                    let color = post_color(obstacle);
                    for x in [obstacle.left_gate_fraction, obstacle.right_gate_fraction] {
                        ctx.draw(&Circle {
                            x,
                            y,
                            radius: POST_RADIUS,
                            color,
                        });
                    }
                }
                ctx.draw(&Circle {
                    x: self.plane.lateral_fraction,
                    y: canvas_y(PLANE_Y),
                    radius: PLANE_RADIUS,
                    color: if self.alert.is_some() {
                        Color::Red
                    } else {
                        Color::Cyan
                    },
                });
            })
            .render(area, buf);
    }
}
