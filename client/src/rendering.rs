use crate::canvas::{denormalize, Canvas};
use macroquad::prelude::*;

const BACKGROUND: Color = Color::new(0.96, 0.96, 0.94, 1.0);
const HUD_TEXT: Color = Color::new(0.15, 0.15, 0.15, 1.0);

/// What the HUD shows besides the canvas contents
#[derive(Debug, Clone)]
pub struct HudConfig<'a> {
    pub connected: bool,
    pub color: &'a str,
    pub width: f32,
}

pub struct Renderer;

impl Renderer {
    pub fn new() -> Self {
        Renderer
    }

    pub fn render(&mut self, canvas: &Canvas, hud: HudConfig<'_>) {
        clear_background(BACKGROUND);

        let (width, height) = (screen_width(), screen_height());
        for stroke in canvas.strokes() {
            let (x0, y0) = denormalize(stroke.x0, stroke.y0, width, height);
            let (x1, y1) = denormalize(stroke.x1, stroke.y1, width, height);
            let color = parse_color(&stroke.color).unwrap_or(BLACK);

            draw_line(x0, y0, x1, y1, stroke.width, color);
            // Round the joints so consecutive segments look continuous
            draw_circle(x1, y1, stroke.width / 2.0, color);
        }

        self.draw_hud(canvas, hud);
    }

    fn draw_hud(&mut self, canvas: &Canvas, hud: HudConfig<'_>) {
        let y_start = 10.0;

        let connection_color = if hud.connected { GREEN } else { RED };
        draw_rectangle(10.0, y_start, 8.0, 8.0, connection_color);
        draw_text("CON", 20.0, y_start + 8.0, 12.0, HUD_TEXT);

        let users = match canvas.user_count() {
            Some(1) => "1 user".to_string(),
            Some(count) => format!("{} users", count),
            None => "- users".to_string(),
        };
        draw_text(&users, 50.0, y_start + 8.0, 12.0, HUD_TEXT);

        let brush = parse_color(hud.color).unwrap_or(BLACK);
        draw_circle(15.0, y_start + 25.0, (hud.width / 2.0).max(2.0), brush);
        draw_text(
            &format!("{} {:.0}px", hud.color, hud.width),
            30.0,
            y_start + 29.0,
            12.0,
            HUD_TEXT,
        );

        if let Some(text) = canvas.notification() {
            let size = measure_text(text, None, 16, 1.0);
            let x = (screen_width() - size.width) / 2.0;
            let y = screen_height() - 20.0;
            draw_rectangle(
                x - 8.0,
                y - size.height - 6.0,
                size.width + 16.0,
                size.height + 12.0,
                Color::from_rgba(0, 0, 0, 170),
            );
            draw_text(text, x, y, 16.0, WHITE);
        }

        draw_text(
            "Drag to draw | 1-6 color | Up/Down width | C clear | Esc quit",
            10.0,
            screen_height() - 6.0,
            12.0,
            Color::from_rgba(120, 120, 120, 255),
        );
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a `#rrggbb` color string.
pub fn parse_color(hex: &str) -> Option<Color> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }

    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
    Some(Color::from_rgba(channel(0..2)?, channel(2..4)?, channel(4..6)?, 255))
}
