//! Decode rules mapping raw OBD-II data bytes to a [`Response`].
//!
//! Formulas follow SAE J1979. `A`, `B`, ... denote the data bytes that follow
//! the echoed service and PID in the adapter's reply.

use crate::response::{Measurement, Payload, Quantity, Response};
use strum_macros::Display;
use uom::si::angle::degree;
use uom::si::angular_velocity::revolution_per_minute;
use uom::si::electric_potential::volt;
use uom::si::f64::{
    Angle, AngularVelocity, ElectricPotential, Length, MassRate, Pressure, Ratio, ThermodynamicTemperature, Time,
    Velocity,
};
use uom::si::length::kilometer;
use uom::si::mass_rate::gram_per_second;
use uom::si::pressure::kilopascal;
use uom::si::ratio::percent;
use uom::si::thermodynamic_temperature::degree_celsius;
use uom::si::time::second;
use uom::si::velocity::kilometer_per_hour;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Decoder {
    /// 32-bit supported-PIDs bitmap
    SupportBitmap,
    /// Monitor status since DTCs cleared (MIL, DTC count)
    MonitorStatus,
    FuelSystemStatus,
    /// A * 100 / 255
    Percent,
    /// (A - 128) * 100 / 128
    CenteredPercent,
    /// A - 40
    Temperature,
    /// A * 3
    FuelPressure,
    /// A
    Pressure,
    /// (256A + B) / 4
    Rpm,
    /// A
    Speed,
    /// A / 2 - 64
    TimingAdvance,
    /// (256A + B) / 100
    AirFlow,
    O2SensorsPresent,
    ObdCompliance,
    /// 256A + B
    Seconds,
    /// 256A + B
    Kilometers,
    /// A, unitless
    Count,
    /// (256A + B) / 1000
    Voltage,
    /// ASCII text, message-count prefix dropped
    Text,
    /// Hex dump, message-count prefix dropped
    Hex,
}

const FUEL_SYSTEM_STATUS: [(u8, &str); 5] = [
    (0x01, "Open loop due to insufficient engine temperature"),
    (0x02, "Closed loop, using oxygen sensor feedback to determine fuel mix"),
    (0x04, "Open loop due to engine load OR fuel cut due to deceleration"),
    (0x08, "Open loop due to system failure"),
    (0x10, "Closed loop, using at least one oxygen sensor but there is a fault in the feedback system"),
];

const OBD_COMPLIANCE: [&str; 14] = [
    "Undefined",
    "OBD-II as defined by the CARB",
    "OBD as defined by the EPA",
    "OBD and OBD-II",
    "OBD-I",
    "Not OBD compliant",
    "EOBD (Europe)",
    "EOBD and OBD-II",
    "EOBD and OBD",
    "EOBD, OBD and OBD II",
    "JOBD (Japan)",
    "JOBD and OBD II",
    "JOBD and EOBD",
    "JOBD, EOBD, and OBD II",
];

impl Decoder {
    /// Number of data bytes the rule consumes, `None` for variable-length payloads.
    pub fn byte_len(self) -> Option<usize> {
        match self {
            Decoder::SupportBitmap | Decoder::MonitorStatus => Some(4),
            Decoder::FuelSystemStatus
            | Decoder::Rpm
            | Decoder::AirFlow
            | Decoder::Seconds
            | Decoder::Kilometers
            | Decoder::Voltage => Some(2),
            Decoder::Percent
            | Decoder::CenteredPercent
            | Decoder::Temperature
            | Decoder::FuelPressure
            | Decoder::Pressure
            | Decoder::Speed
            | Decoder::TimingAdvance
            | Decoder::O2SensorsPresent
            | Decoder::ObdCompliance
            | Decoder::Count => Some(1),
            Decoder::Text | Decoder::Hex => None,
        }
    }

    /// Decode the data bytes of a positive response.
    ///
    /// Truncated data decodes to [`Response::Null`].
    pub fn decode(self, data: &[u8]) -> Response {
        if data.is_empty() || matches!(self.byte_len(), Some(len) if data.len() < len) {
            return Response::Null;
        }

        let word = || u16::from_be_bytes([data[0], data[1]]) as f64;
        let a = data[0] as f64;

        match self {
            Decoder::SupportBitmap => Response::NonNumeric(Payload::Bitmap(data[..4].to_vec())),
            Decoder::MonitorStatus => {
                let mil = if data[0] & 0x80 != 0 { "MIL=ON" } else { "MIL=OFF" };
                let dtc_count = data[0] & 0x7F;
                Response::NonNumeric(Payload::Flags(vec![mil.to_string(), format!("DTC_COUNT={dtc_count}")]))
            }
            Decoder::FuelSystemStatus => {
                let label = FUEL_SYSTEM_STATUS
                    .iter()
                    .find(|(bit, _)| *bit == data[0])
                    .map(|(_, label)| *label)
                    .unwrap_or("Unknown");
                Response::text(label)
            }
            Decoder::O2SensorsPresent => Response::NonNumeric(Payload::Bitmap(data[..1].to_vec())),
            Decoder::ObdCompliance => {
                let label = OBD_COMPLIANCE.get(data[0] as usize).copied().unwrap_or("Reserved");
                Response::text(label)
            }
            Decoder::Count => Response::Numeric(Measurement::Integer(data[0] as i64)),
            Decoder::Text => {
                let text: String = data[1..]
                    .iter()
                    .filter(|b| b.is_ascii_graphic() || **b == b' ')
                    .map(|b| *b as char)
                    .collect();
                Response::text(text.trim())
            }
            Decoder::Hex => Response::text(hex::encode_upper(&data[1..])),
            Decoder::Percent => self.physical(a * 100.0 / 255.0),
            Decoder::CenteredPercent => self.physical((a - 128.0) * 100.0 / 128.0),
            Decoder::Temperature => self.physical(a - 40.0),
            Decoder::FuelPressure => self.physical(a * 3.0),
            Decoder::Pressure | Decoder::Speed => self.physical(a),
            Decoder::TimingAdvance => self.physical(a / 2.0 - 64.0),
            Decoder::Rpm => self.physical(word() / 4.0),
            Decoder::AirFlow => self.physical(word() / 100.0),
            Decoder::Seconds | Decoder::Kilometers => self.physical(word()),
            Decoder::Voltage => self.physical(word() / 1000.0),
        }
    }

    /// Wrap a physical value in the quantity this rule produces.
    ///
    /// Returns `None` for rules whose payload is not a number.
    pub fn measurement(self, value: f64) -> Option<Measurement> {
        let quantity = match self {
            Decoder::Percent | Decoder::CenteredPercent => Quantity::Percent(Ratio::new::<percent>(value)),
            Decoder::Temperature => {
                Quantity::Temperature(ThermodynamicTemperature::new::<degree_celsius>(value))
            }
            Decoder::FuelPressure | Decoder::Pressure => Quantity::Pressure(Pressure::new::<kilopascal>(value)),
            Decoder::Rpm => Quantity::Rotation(AngularVelocity::new::<revolution_per_minute>(value)),
            Decoder::Speed => Quantity::Speed(Velocity::new::<kilometer_per_hour>(value)),
            Decoder::TimingAdvance => Quantity::Angle(Angle::new::<degree>(value)),
            Decoder::AirFlow => Quantity::AirFlow(MassRate::new::<gram_per_second>(value)),
            Decoder::Seconds => Quantity::Duration(Time::new::<second>(value)),
            Decoder::Kilometers => Quantity::Distance(Length::new::<kilometer>(value)),
            Decoder::Voltage => Quantity::Voltage(ElectricPotential::new::<volt>(value)),
            Decoder::Count => return Some(Measurement::Integer(value.round() as i64)),
            Decoder::SupportBitmap
            | Decoder::MonitorStatus
            | Decoder::FuelSystemStatus
            | Decoder::O2SensorsPresent
            | Decoder::ObdCompliance
            | Decoder::Text
            | Decoder::Hex => return None,
        };
        Some(Measurement::Quantity(quantity))
    }

    fn physical(self, value: f64) -> Response {
        self.measurement(value).map(Response::Numeric).unwrap_or(Response::Null)
    }
}
