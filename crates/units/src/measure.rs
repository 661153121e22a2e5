//! Unit and dimension model plus the conversion engine.

use crate::{UnitError, UnitResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Quantity dimension a unit belongs to.
///
/// Every [`Unit`] belongs to exactly one dimension; conversion is only
/// defined within a dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// Mass, canonical base unit gram.
    Mass,
    /// Length, canonical base unit centimetre.
    Length,
}

/// Closed set of measurement units known to the core.
///
/// Each unit carries an exact factor to its dimension's base unit. The
/// pound is defined as exactly 453.59237 g and the inch as exactly 2.54 cm;
/// the remaining factors derive from those definitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Unit {
    /// Gram, the mass base unit.
    Gram,
    /// Kilogram (1000 g).
    Kilogram,
    /// International avoirdupois ounce (453.59237/16 g).
    Ounce,
    /// International avoirdupois pound (exactly 453.59237 g).
    Pound,
    /// Centimetre, the length base unit.
    Centimetre,
    /// Metre (100 cm).
    Metre,
    /// International inch (exactly 2.54 cm).
    Inch,
    /// International foot (30.48 cm).
    Foot,
}

impl Unit {
    /// Returns the quantity dimension this unit belongs to.
    pub fn dimension(self) -> Dimension {
        match self {
            Unit::Gram | Unit::Kilogram | Unit::Ounce | Unit::Pound => Dimension::Mass,
            Unit::Centimetre | Unit::Metre | Unit::Inch | Unit::Foot => Dimension::Length,
        }
    }

    /// Exact factor from this unit to its dimension's base unit.
    pub fn factor(self) -> f64 {
        match self {
            Unit::Gram => 1.0,
            Unit::Kilogram => 1000.0,
            // 453.59237 / 16, exact in decimal and in f64
            Unit::Ounce => 28.349_523_125,
            Unit::Pound => 453.592_37,
            Unit::Centimetre => 1.0,
            Unit::Metre => 100.0,
            Unit::Inch => 2.54,
            Unit::Foot => 30.48,
        }
    }

    /// Convert to the wire format string.
    pub fn to_wire(self) -> &'static str {
        match self {
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Ounce => "oz",
            Unit::Pound => "lb",
            Unit::Centimetre => "cm",
            Unit::Metre => "m",
            Unit::Inch => "in",
            Unit::Foot => "ft",
        }
    }

    /// Parse from the wire format string.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "g" => Some(Unit::Gram),
            "kg" => Some(Unit::Kilogram),
            "oz" => Some(Unit::Ounce),
            "lb" => Some(Unit::Pound),
            "cm" => Some(Unit::Centimetre),
            "m" => Some(Unit::Metre),
            "in" => Some(Unit::Inch),
            "ft" => Some(Unit::Foot),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_wire())
    }
}

// `UnitError::IncompatibleUnits` names its fields `source` and `target`
// (per the spec'd public API). thiserror treats a field named `source` as the
// error's `Error::source()`, which requires the field type to implement
// `std::error::Error`. `Unit` already provides `Debug` + `Display`, so an empty
// impl satisfies that bound without altering any conversion behavior.
impl std::error::Error for Unit {}

impl FromStr for Unit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Unit::from_wire(s).ok_or_else(|| UnitError::UnknownUnit(s.to_owned()))
    }
}

impl Serialize for Unit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_wire())
    }
}

impl<'de> Deserialize<'de> for Unit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Unit::from_wire(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown unit: '{}'", s)))
    }
}

/// Convert `value` from `source` to `target`.
///
/// Conversion is computed as `value * source.factor() / target.factor()`,
/// always passing through the dimension base unit. Converting a unit to
/// itself returns the input unchanged, with no floating-point round trip.
///
/// # Errors
///
/// Returns [`UnitError::IncompatibleUnits`] when `source` and `target`
/// belong to different dimensions. There is no other error path; the
/// function is total for compatible units.
pub fn convert(value: f64, source: Unit, target: Unit) -> UnitResult<f64> {
    if source == target {
        return Ok(value);
    }
    if source.dimension() != target.dimension() {
        return Err(UnitError::IncompatibleUnits { source, target });
    }
    Ok(value * source.factor() / target.factor())
}

/// An immutable measurement value: a magnitude in a concrete unit.
///
/// Conversion produces a new `Measurement`; the source is never mutated.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Magnitude expressed in `unit`.
    pub magnitude: f64,
    /// Unit the magnitude is expressed in.
    pub unit: Unit,
}

impl Measurement {
    /// Create a measurement value.
    pub fn new(magnitude: f64, unit: Unit) -> Self {
        Self { magnitude, unit }
    }

    /// Returns this measurement expressed in `target`.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::IncompatibleUnits`] when `target` belongs to a
    /// different dimension.
    pub fn convert_to(&self, target: Unit) -> UnitResult<Measurement> {
        Ok(Measurement {
            magnitude: convert(self.magnitude, self.unit, target)?,
            unit: target,
        })
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.magnitude, self.unit)
    }
}
