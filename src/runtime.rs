// 50 Hz loop with watchdogs
// Note: a watchdog is a safety mechanism that triggers a safe action if something goes wrong
// Eg. if teleop stops sending commands the base stops, and if the sensor adapter goes quiet
// the actuator gets zero effort instead of a command computed from a stale reading.
// Old odometry is dropped rather than treated as the current velocity.

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tokio::time::interval;
use tracing::{info, warn};
use zenoh::sample::Sample;

use crate::config::{
    CMD_TIMEOUT, ConfigError, LOOP_HZ, SENSOR_TIMEOUT, STATE_TIMEOUT, TOPIC_CMD_ACTUATOR,
    TOPIC_CMD_BASE, TOPIC_HEALTH, TOPIC_RT_ACTUATOR, TOPIC_RT_BASE, TOPIC_STATE_ACTUATOR, TOPIC_STATE_BASE,
    TOPIC_TELEMETRY, TuningConfig,
};
use crate::control::{ControlOutput, ControllerMode, ProfiledActuatorController};
use crate::drive::{Translation2d, VelocityLimiter};
use crate::messages::{
    ActuatorCommand, ActuatorEffort, ActuatorReading, BaseActuation, BaseCommand, BaseState,
    RuntimeHealth,
};
use crate::sim::{ActuatorPlant, BasePlant};
use crate::telemetry::{LogTelemetry, TelemetryFrame, TelemetrySink};

/// Nominal control period in seconds
pub const PERIOD_SECS: f64 = 1.0 / LOOP_HZ as f64;

/// Outputs of one cycle
#[derive(Debug, Clone)]
pub struct Cycle {
    pub base: BaseActuation,
    pub effort: ActuatorEffort,
    pub frame: TelemetryFrame,
}

/// Whether each watchdog has already reported going stale
#[derive(Debug, Clone, Copy, Default)]
struct Stale {
    cmd: bool,
    sensor: bool,
    state: bool,
}

/// Record `stale` into `flag`, returning true only when it just became stale
fn became_stale(flag: &mut bool, stale: bool) -> bool {
    let rising = stale && !*flag;
    *flag = stale;
    rising
}

pub struct Runtime {
    latest_cmd: Option<BaseCommand>,
    cmd_received_at: Instant,
    base_state: Option<BaseState>,
    state_received_at: Instant,
    latest_reading: Option<ActuatorReading>,
    reading_received_at: Instant,
    controller: ProfiledActuatorController,
    limiter: VelocityLimiter,
    stale: Stale,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new(config: &TuningConfig) -> Result<Self, ConfigError> {
        let now = Instant::now();
        Ok(Self {
            latest_cmd: None,
            cmd_received_at: now,
            base_state: None,
            state_received_at: now,
            latest_reading: None,
            reading_received_at: now,
            controller: ProfiledActuatorController::new(config.actuator.clone())?,
            limiter: VelocityLimiter::new(&config.drive)?,
            stale: Stale::default(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        })
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn controller(&self) -> &ProfiledActuatorController {
        &self.controller
    }

    /// Process incoming base command
    pub fn on_command(&mut self, cmd: BaseCommand, now: Instant) {
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = now;
    }

    pub fn on_base_state(&mut self, state: BaseState, now: Instant) {
        self.base_state = Some(state);
        self.state_received_at = now;
    }

    pub fn on_actuator_command(&mut self, cmd: ActuatorCommand) {
        info!("Received actuator command: {:?}", cmd);
        match cmd {
            ActuatorCommand::Goal { position } => self.controller.set_goal(position),
            ActuatorCommand::Stop => self.controller.stop(),
        }
    }

    pub fn on_reading(&mut self, reading: ActuatorReading, now: Instant) {
        self.latest_reading = Some(reading);
        self.reading_received_at = now;
    }

    fn cmd_fresh(&self, now: Instant) -> bool {
        self.latest_cmd.is_some()
            && now.saturating_duration_since(self.cmd_received_at) <= CMD_TIMEOUT
    }

    /// Latest odometry, unless it has gone quiet
    fn fresh_state(&self, now: Instant) -> Option<&BaseState> {
        self.base_state
            .as_ref()
            .filter(|_| now.saturating_duration_since(self.state_received_at) <= STATE_TIMEOUT)
    }

    /// Compute base actuation based on watchdog state, returning the operator request too
    fn compute_base(&mut self, now: Instant) -> (BaseActuation, Translation2d) {
        let cmd_fresh = self.cmd_fresh(now);
        if became_stale(&mut self.stale.cmd, self.latest_cmd.is_some() && !cmd_fresh) {
            let cmd_age = now.saturating_duration_since(self.cmd_received_at);
            warn!("Command stale ({:?} old), stopping base", cmd_age);
        }

        // Without fresh odometry the current velocity is unknown
        let state = self.fresh_state(now);
        let state_stale = self.base_state.is_some() && state.is_none();
        let current = state.map(BaseState::velocity);
        let pose = state.map(BaseState::pose).unwrap_or_default();
        if became_stale(&mut self.stale.state, state_stale) {
            let state_age = now.saturating_duration_since(self.state_received_at);
            warn!("Base state stale ({:?} old), translation unlimited", state_age);
        }

        match self.latest_cmd {
            Some(ref cmd) if cmd_fresh => {
                let requested = cmd.translation();
                let limited = self.limiter.limit(requested, current, &pose);
                (BaseActuation::new(limited, cmd.theta_vel), requested)
            }
            // Watchdog triggered, or no command ever received: stop the base
            _ => (BaseActuation::default(), Translation2d::zero()),
        }
    }

    /// Step the controller unless the reading is stale
    fn compute_effort(&mut self, now: Instant, dt: f64) -> (ControlOutput, Option<RuntimeHealth>) {
        let reading_age = now.saturating_duration_since(self.reading_received_at);
        let reading = self
            .latest_reading
            .as_ref()
            .filter(|_| reading_age <= SENSOR_TIMEOUT);
        let active = self.controller.mode() != ControllerMode::Idle;
        if became_stale(&mut self.stale.sensor, reading.is_none() && active) {
            warn!("Actuator reading stale ({:?} old), holding", reading_age);
        }

        match reading {
            Some(reading) => {
                let output = self.controller.update(reading.into(), dt);
                let health = output.fault.map(|_| RuntimeHealth::SensorFault);
                (output, health)
            }
            None => {
                let output = ControlOutput {
                    effort: 0.0,
                    feedback: 0.0,
                    feedforward: 0.0,
                    setpoint: self.controller.setpoint(),
                    acceleration: 0.0,
                    mode: self.controller.mode(),
                    fault: None,
                };
                (output, active.then_some(RuntimeHealth::SensorStale))
            }
        }
    }

    /// Run one cycle: limit the base translation and step the actuator
    pub fn step(&mut self, now: Instant, dt: f64) -> Cycle {
        let (base, requested) = self.compute_base(now);
        let (output, actuator_health) = self.compute_effort(now, dt);

        self.health = match actuator_health {
            Some(health) => health,
            None if !self.cmd_fresh(now) => RuntimeHealth::CmdStale,
            None if self.fresh_state(now).is_none() => RuntimeHealth::StateStale,
            None => RuntimeHealth::Ok,
        };

        let limited = Translation2d::new(base.x_vel, base.y_vel);
        Cycle {
            effort: ActuatorEffort {
                effort: output.effort,
            },
            frame: TelemetryFrame::new(&output, self.controller.goal(), requested, limited),
            base,
        }
    }
}

/// What `run` needs from the command line
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config: TuningConfig,
    /// Drive simulated plants instead of listening for sensor topics
    pub simulate: bool,
}

fn parse<T: DeserializeOwned>(sample: &Sample, topic: &str) -> Option<T> {
    let payload = sample.payload().to_bytes();
    match serde_json::from_slice::<T>(&payload) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!("Failed to parse message on {}: {}", topic, e);
            None
        }
    }
}

pub async fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut runtime = Runtime::new(&options.config)?;
    let mut telemetry = LogTelemetry;

    let mut sim = if options.simulate {
        info!("Simulating actuator and base");
        let actuator = &options.config.actuator;
        Some((
            ActuatorPlant::new(actuator.feedforward, actuator.travel, actuator.travel.min),
            BasePlant::default(),
        ))
    } else {
        None
    };

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_cmd_base = session.declare_subscriber(TOPIC_CMD_BASE).await?;
    let sub_cmd_actuator = session.declare_subscriber(TOPIC_CMD_ACTUATOR).await?;
    let sensors = if sim.is_none() {
        Some((
            session.declare_subscriber(TOPIC_STATE_BASE).await?,
            session.declare_subscriber(TOPIC_STATE_ACTUATOR).await?,
        ))
    } else {
        None
    };
    let pub_base = session.declare_publisher(TOPIC_RT_BASE).await?;
    let pub_effort = session.declare_publisher(TOPIC_RT_ACTUATOR).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_TELEMETRY).await?;

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms command watchdog, {}ms sensor watchdog, {}ms state watchdog",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis(),
        SENSOR_TIMEOUT.as_millis(),
        STATE_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}, {}", TOPIC_CMD_BASE, TOPIC_CMD_ACTUATOR);
    if sensors.is_some() {
        info!("Subscribed to: {}, {}", TOPIC_STATE_BASE, TOPIC_STATE_ACTUATOR);
    }
    info!(
        "Publishing to: {}, {}, {}, {}",
        TOPIC_RT_BASE, TOPIC_RT_ACTUATOR, TOPIC_HEALTH, TOPIC_TELEMETRY
    );

    loop {
        tick.tick().await;
        let now = Instant::now();

        // 1. Drain all pending messages (non-blocking), keep latest
        while let Ok(Some(sample)) = sub_cmd_base.try_recv() {
            if let Some(cmd) = parse::<BaseCommand>(&sample, TOPIC_CMD_BASE) {
                runtime.on_command(cmd, now);
            }
        }
        while let Ok(Some(sample)) = sub_cmd_actuator.try_recv() {
            if let Some(cmd) = parse::<ActuatorCommand>(&sample, TOPIC_CMD_ACTUATOR) {
                runtime.on_actuator_command(cmd);
            }
        }
        if let Some((ref sub_base, ref sub_actuator)) = sensors {
            while let Ok(Some(sample)) = sub_base.try_recv() {
                if let Some(state) = parse::<BaseState>(&sample, TOPIC_STATE_BASE) {
                    runtime.on_base_state(state, now);
                }
            }
            while let Ok(Some(sample)) = sub_actuator.try_recv() {
                if let Some(reading) = parse::<ActuatorReading>(&sample, TOPIC_STATE_ACTUATOR) {
                    runtime.on_reading(reading, now);
                }
            }
        }
        if let Some((ref actuator, ref base)) = sim {
            runtime.on_reading(actuator.reading(), now);
            runtime.on_base_state(base.state(), now);
        }

        // 2. Compute outputs (includes watchdog logic)
        let cycle = runtime.step(now, PERIOD_SECS);

        if let Some((ref mut actuator, ref mut base)) = sim {
            actuator.step(cycle.effort.effort, PERIOD_SECS);
            let limited = Translation2d::new(cycle.base.x_vel, cycle.base.y_vel);
            base.step(limited, cycle.base.theta_vel, PERIOD_SECS);
        }

        // 3. Publish outputs
        pub_base.put(serde_json::to_string(&cycle.base)?).await?;
        pub_effort.put(serde_json::to_string(&cycle.effort)?).await?;

        // 4. Publish health and telemetry
        pub_health.put(serde_json::to_string(&runtime.health())?).await?;
        pub_telemetry.put(serde_json::to_string(&cycle.frame)?).await?;
        telemetry.record(&cycle.frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> Runtime {
        Runtime::new(&TuningConfig::default()).unwrap()
    }

    fn cmd(x_vel: f64, y_vel: f64, theta_vel: f64) -> BaseCommand {
        BaseCommand {
            x_vel,
            y_vel,
            theta_vel,
        }
    }

    #[test]
    fn test_starts_stale_with_zero_outputs() {
        let mut rt = runtime();
        let cycle = rt.step(Instant::now(), PERIOD_SECS);
        assert_eq!(cycle.base, BaseActuation::default());
        assert_eq!(cycle.effort.effort, 0.0);
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_fresh_command_is_limited_and_keeps_rotation() {
        let mut rt = runtime();
        let now = Instant::now();
        rt.on_base_state(BaseState::default(), now);
        rt.on_command(cmd(100.0, 0.0, 0.7), now);

        let cycle = rt.step(now, PERIOD_SECS);
        assert!(cycle.base.x_vel > 0.0 && cycle.base.x_vel < 100.0);
        assert_eq!(cycle.base.theta_vel, 0.7);
        assert_eq!(cycle.frame.requested, Translation2d::new(100.0, 0.0));
        assert_eq!(rt.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn test_command_watchdog_stops_base() {
        let mut rt = runtime();
        let start = Instant::now();
        rt.on_command(cmd(0.2, 0.0, 0.0), start);

        let later = start + CMD_TIMEOUT + Duration::from_millis(1);
        let cycle = rt.step(later, PERIOD_SECS);
        assert_eq!(cycle.base, BaseActuation::default());
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_actuator_follows_goal_and_stop() {
        let mut rt = runtime();
        let now = Instant::now();
        rt.on_reading(
            ActuatorReading {
                position: 0.0,
                velocity: 0.0,
            },
            now,
        );
        rt.on_actuator_command(ActuatorCommand::Goal { position: 1.0 });
        let cycle = rt.step(now, PERIOD_SECS);
        assert!(cycle.effort.effort > 0.0);
        assert_eq!(cycle.frame.goal, Some(1.0));

        rt.on_actuator_command(ActuatorCommand::Stop);
        let cycle = rt.step(now, PERIOD_SECS);
        assert_eq!(cycle.effort.effort, 0.0);
        assert_eq!(rt.controller().mode(), ControllerMode::Idle);
    }

    #[test]
    fn test_sensor_watchdog_pauses_controller() {
        let mut rt = runtime();
        let start = Instant::now();
        rt.on_reading(
            ActuatorReading {
                position: 0.0,
                velocity: 0.0,
            },
            start,
        );
        rt.on_actuator_command(ActuatorCommand::Goal { position: 1.0 });
        rt.step(start, PERIOD_SECS);
        let held = rt.controller().setpoint();

        let later = start + SENSOR_TIMEOUT + Duration::from_millis(1);
        let cycle = rt.step(later, PERIOD_SECS);
        assert_eq!(cycle.effort.effort, 0.0);
        assert_eq!(rt.health(), RuntimeHealth::SensorStale);
        assert_eq!(rt.controller().setpoint(), held);
    }

    #[test]
    fn test_bad_reading_reports_fault() {
        let mut rt = runtime();
        let now = Instant::now();
        rt.on_actuator_command(ActuatorCommand::Goal { position: 1.0 });
        rt.on_reading(
            ActuatorReading {
                position: f64::NAN,
                velocity: 0.0,
            },
            now,
        );
        let cycle = rt.step(now, PERIOD_SECS);
        assert_eq!(cycle.effort.effort, 0.0);
        assert_eq!(rt.health(), RuntimeHealth::SensorFault);
    }

    #[test]
    fn test_stale_base_state_is_not_used_for_limiting() {
        let mut rt = runtime();
        let start = Instant::now();
        let moving = BaseState {
            x_vel: 6.0,
            ..BaseState::default()
        };
        rt.on_base_state(moving, start);
        rt.on_command(cmd(0.1, 0.0, 0.0), start);

        // Fresh odometry: braking from 6 m/s is eased
        let cycle = rt.step(start, PERIOD_SECS);
        assert!(cycle.base.x_vel > 1.0);
        assert_eq!(rt.health(), RuntimeHealth::Ok);

        // Odometry goes quiet while commands keep arriving
        let later = start + STATE_TIMEOUT + Duration::from_millis(1);
        for i in 0..5 {
            let now = later + Duration::from_millis(20 * i);
            rt.on_command(cmd(0.1, 0.0, 0.0), now);
            let cycle = rt.step(now, PERIOD_SECS);
            assert_eq!(cycle.base.x_vel, 0.1);
        }
        assert_eq!(rt.health(), RuntimeHealth::StateStale);
    }

    #[test]
    fn test_watchdogs_go_stale_once() {
        let mut rt = runtime();
        let start = Instant::now();
        rt.on_command(cmd(0.2, 0.0, 0.0), start);
        rt.on_base_state(BaseState::default(), start);
        rt.on_reading(
            ActuatorReading {
                position: 0.0,
                velocity: 0.0,
            },
            start,
        );
        rt.on_actuator_command(ActuatorCommand::Goal { position: 1.0 });
        rt.step(start, PERIOD_SECS);

        // Everything quiet; the actuator's health wins the published value
        let late = start + CMD_TIMEOUT + Duration::from_millis(1);
        let mut rising = [0; 3];
        for i in 0..20 {
            let before = rt.stale;
            rt.step(late + Duration::from_millis(20 * i), PERIOD_SECS);
            let flags = [
                (before.cmd, rt.stale.cmd),
                (before.sensor, rt.stale.sensor),
                (before.state, rt.stale.state),
            ];
            for (count, (was, is)) in rising.iter_mut().zip(flags) {
                if is && !was {
                    *count += 1;
                }
            }
        }
        assert_eq!(rising, [1, 1, 1]);
        assert_eq!(rt.health(), RuntimeHealth::SensorStale);

        // A fresh command re-arms its watchdog
        let now = late + Duration::from_secs(1);
        rt.on_command(cmd(0.2, 0.0, 0.0), now);
        rt.step(now, PERIOD_SECS);
        assert!(!rt.stale.cmd);
    }
}
