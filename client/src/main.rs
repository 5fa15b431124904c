use clap::Parser;
use client::canvas::Canvas;
use client::input::{InputAction, InputManager};
use client::network::{NetworkEvent, NetworkHandle};
use client::rendering::{HudConfig, Renderer};
use log::{info, warn};
use macroquad::prelude::*;
use shared::{Message, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(author, version, about = "Shared whiteboard client", long_about = None)]
struct Args {
    /// Relay WebSocket URL
    #[arg(short = 's', long, default_value_t = format!("ws://127.0.0.1:{}", DEFAULT_PORT))]
    server: String,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    width: i32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    height: i32,

    /// Brush color as #rrggbb (random palette color if omitted)
    #[arg(short = 'c', long)]
    color: Option<String>,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Whiteboard".to_string(),
        window_width: args.width,
        window_height: args.height,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    info!("Starting whiteboard client...");
    info!("Connecting to: {}", args.server);
    info!("Controls: drag to draw, 1-6 color, Up/Down width, C to clear");

    let network = NetworkHandle::spawn(args.server);
    let mut canvas = Canvas::new();
    let mut input = InputManager::new(args.color);
    let mut renderer = Renderer::new();
    let mut connected = false;

    prevent_quit();

    loop {
        for event in network.poll() {
            match event {
                NetworkEvent::Connected => connected = true,
                NetworkEvent::Message(message) => {
                    canvas.apply(&message);
                }
                NetworkEvent::Disconnected(reason) => {
                    warn!("Lost connection to relay: {}", reason);
                    connected = false;
                    canvas.reset_presence();
                }
            }
        }

        for action in input.update() {
            match action {
                InputAction::Stroke(stroke) => {
                    if connected {
                        network.send(Message::draw(&stroke));
                    }
                    canvas.add_local(stroke);
                }
                InputAction::Clear => {
                    if connected {
                        network.send(Message::clear());
                    } else {
                        canvas.apply(&Message::clear());
                    }
                }
            }
        }

        renderer.render(
            &canvas,
            HudConfig {
                connected,
                color: input.color(),
                width: input.width(),
            },
        );

        if is_key_pressed(KeyCode::Escape) || is_quit_requested() {
            break;
        }

        next_frame().await;
    }

    info!("Shutting down");
    network.shutdown();
}
