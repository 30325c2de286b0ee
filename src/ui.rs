pub mod charting;
pub mod field;
pub mod screen;
pub mod stimulus;

use ratatui::{buffer::Buffer, layout::Rect, widgets::Widget};

use crate::App;

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        screen::current_screen(self.session.phase()).render(self, area, buf);
    }
}
