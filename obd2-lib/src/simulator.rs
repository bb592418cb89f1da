//! Hardware-free [`DeviceSession`] driven by synthetic driving profiles.

use crate::command::{CommandCatalog, CommandDescriptor, CommandKey};
use crate::constants::{LIVE_DATA_SERVICE, VEHICLE_INFO_SERVICE};
use crate::error::SessionError;
use crate::response::Response;
use crate::session::DeviceSession;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeSet, HashMap};
use std::f64::consts::PI;
use std::time::Duration;
use strum_macros::Display;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Profile {
    Idle,
    City,
    Highway,
}

impl Profile {
    pub const ALL: [Profile; 3] = [Profile::Idle, Profile::City, Profile::Highway];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.to_string().eq_ignore_ascii_case(name))
    }

    fn channels(self) -> &'static [Channel] {
        match self {
            Profile::Idle => IDLE,
            Profile::City => CITY,
            Profile::Highway => HIGHWAY,
        }
    }
}

/// How a simulated value evolves over time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pattern {
    Fixed(f64),
    Sine { base: f64, amplitude: f64, period: Duration },
    /// Triangle wave rising from `base` to `base + amplitude` and back.
    Ramp { base: f64, amplitude: f64, period: Duration },
    RandomWalk { base: f64, step: f64, min: f64, max: f64 },
}

impl Pattern {
    fn initial(self) -> f64 {
        match self {
            Pattern::Fixed(v) => v,
            Pattern::Sine { base, .. } | Pattern::Ramp { base, .. } | Pattern::RandomWalk { base, .. } => base,
        }
    }
}

/// One simulated PID: its pattern plus the physical range of the encoding.
#[derive(Debug, Clone, Copy)]
struct Channel {
    pid: u8,
    pattern: Pattern,
    range: (f64, f64),
}

const fn fixed(pid: u8, value: f64, range: (f64, f64)) -> Channel {
    Channel { pid, pattern: Pattern::Fixed(value), range }
}

const fn sine(pid: u8, base: f64, amplitude: f64, period_ms: u64, range: (f64, f64)) -> Channel {
    let period = Duration::from_millis(period_ms);
    Channel { pid, pattern: Pattern::Sine { base, amplitude, period }, range }
}

const fn ramp(pid: u8, base: f64, amplitude: f64, period_ms: u64, range: (f64, f64)) -> Channel {
    let period = Duration::from_millis(period_ms);
    Channel { pid, pattern: Pattern::Ramp { base, amplitude, period }, range }
}

const fn walk(pid: u8, base: f64, step: f64, min: f64, max: f64, range: (f64, f64)) -> Channel {
    Channel { pid, pattern: Pattern::RandomWalk { base, step, min, max }, range }
}

const RPM: (u8, (f64, f64)) = (0x0C, (0.0, 8000.0));
const SPEED: (u8, (f64, f64)) = (0x0D, (0.0, 255.0));
const COOLANT: (u8, (f64, f64)) = (0x05, (-40.0, 215.0));
const THROTTLE: (u8, (f64, f64)) = (0x11, (0.0, 100.0));
const INTAKE_TEMP: (u8, (f64, f64)) = (0x0F, (-40.0, 215.0));
const LOAD: (u8, (f64, f64)) = (0x04, (0.0, 100.0));
const BARO: (u8, (f64, f64)) = (0x33, (0.0, 255.0));
const MAP: (u8, (f64, f64)) = (0x0B, (0.0, 255.0));
const FUEL: (u8, (f64, f64)) = (0x2F, (0.0, 100.0));
const VOLTAGE: (u8, (f64, f64)) = (0x42, (0.0, 65.535));

#[rustfmt::skip]
const IDLE: &[Channel] = &[
    sine(RPM.0, 750.0, 50.0, 5000, RPM.1),
    fixed(SPEED.0, 0.0, SPEED.1),
    walk(COOLANT.0, 85.0, 0.5, 80.0, 95.0, COOLANT.1),
    ramp(THROTTLE.0, 2.0, 6.0, 3000, THROTTLE.1),
    fixed(INTAKE_TEMP.0, 25.0, INTAKE_TEMP.1),
    sine(LOAD.0, 20.0, 10.0, 4000, LOAD.1),
    fixed(BARO.0, 101.0, BARO.1),
    sine(MAP.0, 35.0, 5.0, 4000, MAP.1),
    walk(FUEL.0, 60.0, 0.1, 50.0, 70.0, FUEL.1),
    sine(VOLTAGE.0, 14.2, 0.1, 6000, VOLTAGE.1),
];

#[rustfmt::skip]
const CITY: &[Channel] = &[
    walk(RPM.0, 2000.0, 200.0, 700.0, 4500.0, RPM.1),
    walk(SPEED.0, 40.0, 5.0, 0.0, 80.0, SPEED.1),
    walk(COOLANT.0, 90.0, 0.3, 85.0, 100.0, COOLANT.1),
    walk(THROTTLE.0, 25.0, 5.0, 0.0, 80.0, THROTTLE.1),
    walk(INTAKE_TEMP.0, 30.0, 1.0, 20.0, 45.0, INTAKE_TEMP.1),
    walk(LOAD.0, 40.0, 8.0, 10.0, 85.0, LOAD.1),
    fixed(BARO.0, 101.0, BARO.1),
    walk(MAP.0, 50.0, 10.0, 20.0, 120.0, MAP.1),
    walk(FUEL.0, 55.0, 0.2, 40.0, 70.0, FUEL.1),
    sine(VOLTAGE.0, 14.0, 0.3, 5000, VOLTAGE.1),
];

#[rustfmt::skip]
const HIGHWAY: &[Channel] = &[
    sine(RPM.0, 3000.0, 300.0, 8000, RPM.1),
    sine(SPEED.0, 100.0, 10.0, 10000, SPEED.1),
    walk(COOLANT.0, 95.0, 0.2, 90.0, 105.0, COOLANT.1),
    sine(THROTTLE.0, 35.0, 8.0, 6000, THROTTLE.1),
    walk(INTAKE_TEMP.0, 35.0, 0.5, 25.0, 45.0, INTAKE_TEMP.1),
    sine(LOAD.0, 45.0, 15.0, 7000, LOAD.1),
    fixed(BARO.0, 101.0, BARO.1),
    sine(MAP.0, 80.0, 20.0, 6000, MAP.1),
    walk(FUEL.0, 50.0, 0.3, 30.0, 65.0, FUEL.1),
    sine(VOLTAGE.0, 14.4, 0.2, 8000, VOLTAGE.1),
];

const VEHICLE_INFO: [(u8, &str); 4] = [
    (0x02, "1SIM0BD2CAPTURE01"),
    (0x04, "SIMCAL-0001"),
    (0x06, "5A3C9E01"),
    (0x0A, "ECM-EngineControl"),
];

pub struct SimulatedSession {
    profile: Profile,
    port: String,
    channels: HashMap<CommandKey, Channel>,
    walk_values: HashMap<CommandKey, f64>,
    supported: BTreeSet<CommandDescriptor>,
    rng: StdRng,
    started: Instant,
}

impl SimulatedSession {
    /// Every profile PID and vehicle-info entry found in `catalog` is reported as supported.
    pub fn new(profile: Profile, catalog: &impl CommandCatalog) -> Self {
        let channels: HashMap<CommandKey, Channel> = profile
            .channels()
            .iter()
            .map(|c| (CommandKey::new(LIVE_DATA_SERVICE, c.pid), *c))
            .collect();

        let supported = channels
            .keys()
            .copied()
            .chain(VEHICLE_INFO.iter().map(|(pid, _)| CommandKey::new(VEHICLE_INFO_SERVICE, *pid)))
            .filter_map(|key| catalog.lookup(key))
            .cloned()
            .collect();

        let mut session = Self {
            profile,
            port: format!("simulator:{profile}"),
            channels,
            walk_values: HashMap::new(),
            supported,
            rng: StdRng::from_entropy(),
            started: Instant::now(),
        };
        session.reset_walks();
        info!("Simulated session started with the {} profile", profile);
        session
    }

    /// Replace the random source with a seeded one and restart every random walk.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self.reset_walks();
        self
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    fn reset_walks(&mut self) {
        self.walk_values = self
            .channels
            .iter()
            .filter(|(_, c)| matches!(c.pattern, Pattern::RandomWalk { .. }))
            .map(|(key, c)| (*key, c.pattern.initial()))
            .collect();
    }

    fn sample(&mut self, key: CommandKey, channel: Channel) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        let value = match channel.pattern {
            Pattern::Fixed(v) => v,
            Pattern::Sine { base, amplitude, period } => {
                base + amplitude * (2.0 * PI * elapsed / period.as_secs_f64()).sin()
            }
            Pattern::Ramp { base, amplitude, period } => {
                let phase = (elapsed % period.as_secs_f64()) / period.as_secs_f64();
                let tri = if phase < 0.5 { phase * 2.0 } else { 2.0 - phase * 2.0 };
                base + amplitude * tri
            }
            Pattern::RandomWalk { base, step, min, max } => {
                let current = self.walk_values.get(&key).copied().unwrap_or(base);
                let next = (current + self.rng.gen_range(-step..=step)).clamp(min, max);
                self.walk_values.insert(key, next);
                next
            }
        };
        value.clamp(channel.range.0, channel.range.1)
    }
}

impl DeviceSession for SimulatedSession {
    async fn query(&mut self, command: &CommandDescriptor) -> Result<Response, SessionError> {
        if !self.supported.contains(command) {
            return Ok(Response::Null);
        }
        let key = command.key();
        if key.service == VEHICLE_INFO_SERVICE {
            let text = VEHICLE_INFO.iter().find(|(pid, _)| *pid == key.pid).map(|(_, text)| *text);
            return Ok(text.map(Response::text).unwrap_or(Response::Null));
        }

        let Some(channel) = self.channels.get(&key).copied() else {
            return Ok(Response::Null);
        };
        let value = self.sample(key, channel);
        debug!("{} -> {:.3}", command, value);
        Ok(command
            .decoder
            .measurement(value)
            .map(Response::Numeric)
            .unwrap_or(Response::Null))
    }

    fn supported_commands(&self) -> &BTreeSet<CommandDescriptor> {
        &self.supported
    }

    fn protocol_name(&self) -> &str {
        "Simulated"
    }

    fn port_name(&self) -> &str {
        &self.port
    }
}
