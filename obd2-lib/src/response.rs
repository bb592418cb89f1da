//! Decoded adapter responses and the value normalizer.
//!
//! A [`DeviceSession`](crate::session::DeviceSession) answers every query with a
//! [`Response`]. Only [`Response::Numeric`] values are recordable; the rest are
//! kept for diagnostic listings.

use std::fmt;
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

/// A physical quantity with its unit attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quantity {
    Rotation(AngularVelocity),
    Speed(Velocity),
    Temperature(ThermodynamicTemperature),
    Percent(Ratio),
    Pressure(Pressure),
    Voltage(ElectricPotential),
    Angle(Angle),
    AirFlow(MassRate),
    Duration(Time),
    Distance(Length),
}

impl Quantity {
    /// Magnitude expressed in the unit returned by [`Quantity::unit`].
    ///
    /// Rounded to six decimals; quantities are stored in SI base units.
    pub fn magnitude(&self) -> f64 {
        let raw = match self {
            Quantity::Rotation(q) => q.get::<revolution_per_minute>(),
            Quantity::Speed(q) => q.get::<kilometer_per_hour>(),
            Quantity::Temperature(q) => q.get::<degree_celsius>(),
            Quantity::Percent(q) => q.get::<percent>(),
            Quantity::Pressure(q) => q.get::<kilopascal>(),
            Quantity::Voltage(q) => q.get::<volt>(),
            Quantity::Angle(q) => q.get::<degree>(),
            Quantity::AirFlow(q) => q.get::<gram_per_second>(),
            Quantity::Duration(q) => q.get::<second>(),
            Quantity::Distance(q) => q.get::<kilometer>(),
        };
        (raw * 1e6).round() / 1e6
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Quantity::Rotation(_) => "rpm",
            Quantity::Speed(_) => "km/h",
            Quantity::Temperature(_) => "°C",
            Quantity::Percent(_) => "%",
            Quantity::Pressure(_) => "kPa",
            Quantity::Voltage(_) => "V",
            Quantity::Angle(_) => "°",
            Quantity::AirFlow(_) => "g/s",
            Quantity::Duration(_) => "s",
            Quantity::Distance(_) => "km",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.magnitude(), self.unit())
    }
}

/// A numeric decode result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    Quantity(Quantity),
    Integer(i64),
    Float(f64),
}

/// Payloads that carry no single number: status words, bitmaps, strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Flags(Vec<String>),
    Bitmap(Vec<u8>),
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(s) => f.write_str(s),
            Payload::Flags(flags) => write!(f, "[{}]", flags.join(", ")),
            Payload::Bitmap(bytes) => write!(f, "0x{}", hex::encode_upper(bytes)),
        }
    }
}

/// Result of querying one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Numeric(Measurement),
    NonNumeric(Payload),
    /// The PID is unsupported or currently has no data.
    Null,
}

impl Response {
    pub fn is_null(&self) -> bool {
        matches!(self, Response::Null)
    }

    pub fn quantity(q: Quantity) -> Self {
        Response::Numeric(Measurement::Quantity(q))
    }

    pub fn text(s: impl Into<String>) -> Self {
        Response::NonNumeric(Payload::Text(s.into()))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Numeric(Measurement::Quantity(q)) => write!(f, "{q}"),
            Response::Numeric(Measurement::Integer(v)) => write!(f, "{v}"),
            Response::Numeric(Measurement::Float(v)) => write!(f, "{v}"),
            Response::NonNumeric(payload) => write!(f, "{payload}"),
            Response::Null => f.write_str("(no data)"),
        }
    }
}

/// Convert a response into a recordable `(value, unit)` pair.
///
/// Plain numbers carry an empty unit. Non-numeric payloads and null responses
/// yield `None`.
pub fn normalize(response: &Response) -> Option<(f64, &'static str)> {
    match response {
        Response::Numeric(Measurement::Quantity(q)) => Some((q.magnitude(), q.unit())),
        Response::Numeric(Measurement::Integer(v)) => Some((*v as f64, "")),
        Response::Numeric(Measurement::Float(v)) => Some((*v, "")),
        Response::NonNumeric(_) | Response::Null => None,
    }
}
