//! Command descriptors and the catalog that resolves them.

use crate::constants::{LIVE_DATA_SERVICE, SUPPORT_BITMAP_PREFIX, VEHICLE_INFO_SERVICE};
use crate::decode::Decoder;
use crate::response::Response;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a command: service id and PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandKey {
    pub service: u8,
    pub pid: u8,
}

impl CommandKey {
    pub const fn new(service: u8, pid: u8) -> Self {
        Self { service, pid }
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.service, self.pid)
    }
}

/// A queryable PID as described by a [`CommandCatalog`].
///
/// Equality, ordering and hashing only consider the [`CommandKey`].
#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    pub service: u8,
    pub pid: u8,
    pub name: String,
    pub description: String,
    pub decoder: Decoder,
}

impl CommandDescriptor {
    pub fn new(service: u8, pid: u8, name: impl Into<String>, description: impl Into<String>, decoder: Decoder) -> Self {
        Self {
            service,
            pid,
            name: name.into(),
            description: description.into(),
            decoder,
        }
    }

    pub fn key(&self) -> CommandKey {
        CommandKey::new(self.service, self.pid)
    }

    /// Four-character uppercase hex code, e.g. `010C`.
    pub fn code(&self) -> String {
        self.key().to_string()
    }

    /// Supported-PIDs bitmap entries are protocol plumbing, never recorded.
    pub fn is_support_bitmap(&self) -> bool {
        self.name.starts_with(SUPPORT_BITMAP_PREFIX)
    }

    pub fn decode(&self, data: &[u8]) -> Response {
        self.decoder.decode(data)
    }
}

impl PartialEq for CommandDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for CommandDescriptor {}

impl Hash for CommandDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for CommandDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CommandDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.name)
    }
}

/// Lookup service over a table of command definitions.
pub trait CommandCatalog {
    fn lookup(&self, key: CommandKey) -> Option<&CommandDescriptor>;

    /// Case-insensitive symbolic name lookup across all services.
    fn by_name(&self, name: &str) -> Option<&CommandDescriptor>;

    /// Every descriptor, ordered by key.
    fn commands(&self) -> &[CommandDescriptor];
}

/// In-memory catalog with the key and name maps built once up front.
#[derive(Debug, Clone)]
pub struct StandardCatalog {
    commands: Vec<CommandDescriptor>,
    by_key: BTreeMap<CommandKey, usize>,
    by_name: HashMap<String, usize>,
}

impl StandardCatalog {
    /// The built-in service 01 / service 09 command table.
    pub fn new() -> Self {
        Self::from_commands(
            STANDARD_COMMANDS
                .iter()
                .map(|&(service, pid, name, description, decoder)| {
                    CommandDescriptor::new(service, pid, name, description, decoder)
                })
                .collect(),
        )
    }

    /// Build a catalog from arbitrary descriptors. Later duplicates of a key are dropped.
    pub fn from_commands(mut commands: Vec<CommandDescriptor>) -> Self {
        commands.sort();
        commands.dedup();

        let by_key = commands.iter().enumerate().map(|(i, c)| (c.key(), i)).collect();
        let by_name = commands
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.to_ascii_uppercase(), i))
            .collect();

        Self {
            commands,
            by_key,
            by_name,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for StandardCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandCatalog for StandardCatalog {
    fn lookup(&self, key: CommandKey) -> Option<&CommandDescriptor> {
        self.by_key.get(&key).map(|&i| &self.commands[i])
    }

    fn by_name(&self, name: &str) -> Option<&CommandDescriptor> {
        self.by_name.get(&name.to_ascii_uppercase()).map(|&i| &self.commands[i])
    }

    fn commands(&self) -> &[CommandDescriptor] {
        &self.commands
    }
}

const S01: u8 = LIVE_DATA_SERVICE;
const S09: u8 = VEHICLE_INFO_SERVICE;

#[rustfmt::skip]
const STANDARD_COMMANDS: &[(u8, u8, &str, &str, Decoder)] = &[
    (S01, 0x00, "PIDS_A", "Supported PIDs [01-20]", Decoder::SupportBitmap),
    (S01, 0x01, "STATUS", "Status since DTCs cleared", Decoder::MonitorStatus),
    (S01, 0x03, "FUEL_STATUS", "Fuel System Status", Decoder::FuelSystemStatus),
    (S01, 0x04, "ENGINE_LOAD", "Calculated Engine Load", Decoder::Percent),
    (S01, 0x05, "COOLANT_TEMP", "Engine Coolant Temperature", Decoder::Temperature),
    (S01, 0x06, "SHORT_FUEL_TRIM_1", "Short Term Fuel Trim - Bank 1", Decoder::CenteredPercent),
    (S01, 0x07, "LONG_FUEL_TRIM_1", "Long Term Fuel Trim - Bank 1", Decoder::CenteredPercent),
    (S01, 0x08, "SHORT_FUEL_TRIM_2", "Short Term Fuel Trim - Bank 2", Decoder::CenteredPercent),
    (S01, 0x09, "LONG_FUEL_TRIM_2", "Long Term Fuel Trim - Bank 2", Decoder::CenteredPercent),
    (S01, 0x0A, "FUEL_PRESSURE", "Fuel Pressure", Decoder::FuelPressure),
    (S01, 0x0B, "INTAKE_PRESSURE", "Intake Manifold Pressure", Decoder::Pressure),
    (S01, 0x0C, "RPM", "Engine RPM", Decoder::Rpm),
    (S01, 0x0D, "SPEED", "Vehicle Speed", Decoder::Speed),
    (S01, 0x0E, "TIMING_ADVANCE", "Timing Advance", Decoder::TimingAdvance),
    (S01, 0x0F, "INTAKE_TEMP", "Intake Air Temp", Decoder::Temperature),
    (S01, 0x10, "MAF", "Air Flow Rate (MAF)", Decoder::AirFlow),
    (S01, 0x11, "THROTTLE_POS", "Throttle Position", Decoder::Percent),
    (S01, 0x13, "O2_SENSORS", "O2 Sensors Present", Decoder::O2SensorsPresent),
    (S01, 0x1C, "OBD_COMPLIANCE", "OBD Standards Compliance", Decoder::ObdCompliance),
    (S01, 0x1F, "RUN_TIME", "Engine Run Time", Decoder::Seconds),
    (S01, 0x20, "PIDS_B", "Supported PIDs [21-40]", Decoder::SupportBitmap),
    (S01, 0x21, "DISTANCE_W_MIL", "Distance Traveled with MIL on", Decoder::Kilometers),
    (S01, 0x2F, "FUEL_LEVEL", "Fuel Level Input", Decoder::Percent),
    (S01, 0x30, "WARMUPS_SINCE_DTC_CLEAR", "Number of warm-ups since codes cleared", Decoder::Count),
    (S01, 0x31, "DISTANCE_SINCE_DTC_CLEAR", "Distance traveled since codes cleared", Decoder::Kilometers),
    (S01, 0x33, "BAROMETRIC_PRESSURE", "Barometric Pressure", Decoder::Pressure),
    (S01, 0x40, "PIDS_C", "Supported PIDs [41-60]", Decoder::SupportBitmap),
    (S01, 0x42, "CONTROL_MODULE_VOLTAGE", "Control module voltage", Decoder::Voltage),
    (S01, 0x45, "RELATIVE_THROTTLE_POS", "Relative throttle position", Decoder::Percent),
    (S01, 0x46, "AMBIANT_AIR_TEMP", "Ambient air temperature", Decoder::Temperature),
    (S01, 0x4D, "RUN_TIME_MIL", "Time run with MIL on", Decoder::Seconds),
    (S01, 0x5C, "OIL_TEMP", "Engine oil temperature", Decoder::Temperature),
    (S09, 0x00, "PIDS_9A", "Supported PIDs [01-20]", Decoder::SupportBitmap),
    (S09, 0x02, "VIN", "Vehicle Identification Number", Decoder::Text),
    (S09, 0x04, "CALIBRATION_ID", "Calibration ID", Decoder::Text),
    (S09, 0x06, "CVN", "Calibration Verification Numbers", Decoder::Hex),
    (S09, 0x0A, "ECU_NAME", "ECU Name", Decoder::Text),
];
