//! Client input management: turns mouse drags into stroke segments

use crate::canvas::normalize;
use macroquad::input::{
    is_key_pressed, is_mouse_button_down, mouse_position, KeyCode, MouseButton,
};
use macroquad::window::{screen_height, screen_width};
use rand::Rng;
use shared::Stroke;

/// Colors selectable with the number keys
pub const PALETTE: [&str; 6] = [
    "#000000", "#e53935", "#43a047", "#1e88e5", "#fdd835", "#8e24aa",
];

pub const MIN_WIDTH: f32 = 1.0;
pub const MAX_WIDTH: f32 = 24.0;
const DEFAULT_WIDTH: f32 = 3.0;

// Movement below this (in normalized units) does not produce a segment
const MIN_SEGMENT: f32 = 0.001;

/// One frame worth of sampled input
#[derive(Debug, Clone, Default)]
pub struct FrameInput {
    pub mouse: (f32, f32),
    pub drawing: bool,
    pub clear: bool,
    pub color_slot: Option<usize>,
    pub width_delta: f32,
}

/// What the client should do in response to input
#[derive(Debug, Clone, PartialEq)]
pub enum InputAction {
    Stroke(Stroke),
    Clear,
}

pub struct InputManager {
    color: String,
    width: f32,
    last_point: Option<(f32, f32)>,
}

impl InputManager {
    pub fn new(color: Option<String>) -> Self {
        let color = color.unwrap_or_else(|| {
            let slot = rand::thread_rng().gen_range(0..PALETTE.len());
            PALETTE[slot].to_string()
        });

        Self {
            color,
            width: DEFAULT_WIDTH,
            last_point: None,
        }
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    /// Samples macroquad input for the current frame
    pub fn update(&mut self) -> Vec<InputAction> {
        let color_keys = [
            KeyCode::Key1,
            KeyCode::Key2,
            KeyCode::Key3,
            KeyCode::Key4,
            KeyCode::Key5,
            KeyCode::Key6,
        ];

        let mut width_delta = 0.0;
        if is_key_pressed(KeyCode::Up) {
            width_delta += 1.0;
        }
        if is_key_pressed(KeyCode::Down) {
            width_delta -= 1.0;
        }

        let frame = FrameInput {
            mouse: mouse_position(),
            drawing: is_mouse_button_down(MouseButton::Left),
            clear: is_key_pressed(KeyCode::C),
            color_slot: color_keys.iter().position(|key| is_key_pressed(*key)),
            width_delta,
        };

        self.process(&frame, screen_width(), screen_height())
    }

    /// Applies sampled input against a window of the given size
    pub fn process(&mut self, frame: &FrameInput, width: f32, height: f32) -> Vec<InputAction> {
        let mut actions = Vec::new();

        if let Some(color) = frame.color_slot.and_then(|slot| PALETTE.get(slot)) {
            self.color = color.to_string();
        }
        self.width = (self.width + frame.width_delta).clamp(MIN_WIDTH, MAX_WIDTH);

        if frame.clear {
            actions.push(InputAction::Clear);
        }

        if !frame.drawing {
            self.last_point = None;
            return actions;
        }

        let (x, y) = normalize(frame.mouse.0, frame.mouse.1, width, height);
        match self.last_point {
            Some((x0, y0)) => {
                let moved = (x - x0).abs().max((y - y0).abs());
                if moved >= MIN_SEGMENT {
                    actions.push(InputAction::Stroke(Stroke {
                        x0,
                        y0,
                        x1: x,
                        y1: y,
                        color: self.color.clone(),
                        width: self.width,
                    }));
                    self.last_point = Some((x, y));
                }
            }
            None => self.last_point = Some((x, y)),
        }

        actions
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new(None)
    }
}
