// Keyboard teleop: WASD move, Z/X rotate, R/F speed, 1-4 actuator presets, Space stop actuator, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use mech_motion_runtime::config::{TOPIC_CMD_ACTUATOR, TOPIC_CMD_BASE};
use mech_motion_runtime::messages::{ActuatorCommand, BaseCommand};

const SPEEDS: [f64; 3] = [0.5, 1.5, 3.0]; // m/s
const THETA_SPEEDS: [f64; 3] = [0.5, 1.5, 3.0]; // rad/s
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input

// Actuator presets (m)
const PRESETS: [f64; 4] = [0.0, 0.45, 0.9, 1.6];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_base = session.declare_publisher(TOPIC_CMD_BASE).await?;
    let pub_actuator = session.declare_publisher(TOPIC_CMD_ACTUATOR).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, 1-4=actuator preset, Space=stop actuator, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pub_base, &pub_actuator).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    pub_base: &zenoh::pubsub::Publisher<'_>,
    pub_actuator: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Persistent velocity state
    let mut x_vel = 0.0;
    let mut y_vel = 0.0;
    let mut theta_vel = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    // Movement - update velocity and refresh timestamp
                    KeyCode::Char('w') if pressed => {
                        x_vel = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        x_vel = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        y_vel = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        y_vel = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    // Rotation
                    KeyCode::Char('z') if pressed => {
                        theta_vel = THETA_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        theta_vel = -THETA_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Actuator
                    KeyCode::Char(c @ '1'..='4') if kind == KeyEventKind::Press => {
                        let position = PRESETS[c as usize - '1' as usize];
                        info!("Actuator goal: {} m", position);
                        let cmd = ActuatorCommand::Goal { position };
                        pub_actuator.put(serde_json::to_string(&cmd)?).await?;
                    }
                    KeyCode::Char(' ') if kind == KeyEventKind::Press => {
                        info!("Actuator stop");
                        pub_actuator
                            .put(serde_json::to_string(&ActuatorCommand::Stop)?)
                            .await?;
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Reset velocities if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            x_vel = 0.0;
            y_vel = 0.0;
            theta_vel = 0.0;
        }

        // Always publish at ~50Hz
        let cmd = BaseCommand {
            x_vel,
            y_vel,
            theta_vel,
        };
        pub_base.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
