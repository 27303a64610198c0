//! Typed measurements for workout data
//!
//! A [`Quantity`] is a decimal value tagged with its [`Unit`]. Arithmetic between
//! quantities converts the right-hand side into the left-hand unit and refuses to
//! mix kinds (a distance never adds to a duration).

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const METERS_PER_KILOMETER: Decimal = dec!(1000);
pub const METERS_PER_MILE: Decimal = dec!(1609.344);
pub const METERS_PER_FOOT: Decimal = dec!(0.3048);
pub const SECONDS_PER_MINUTE: Decimal = dec!(60);
pub const KILOMETERS_PER_MILE: Decimal = dec!(1.609344);

/// Quantity arithmetic errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuantityError {
    #[error("Incompatible units: cannot combine {from} with {to}")]
    IncompatibleUnits { from: Unit, to: Unit },

    #[error("Division by zero in {operation}")]
    DivisionByZero { operation: String },

    #[error("Arithmetic overflow in {operation}")]
    Overflow { operation: String },
}

/// Physical dimension a unit measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    Length,
    Time,
    Pace,
    Ratio,
}

/// Measurement units used across workout records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Meters,
    Kilometers,
    Miles,
    Feet,
    Seconds,
    Minutes,
    MinutesPerKilometer,
    MinutesPerMile,
    Percent,
}

impl Unit {
    pub fn kind(&self) -> UnitKind {
        match self {
            Unit::Meters | Unit::Kilometers | Unit::Miles | Unit::Feet => UnitKind::Length,
            Unit::Seconds | Unit::Minutes => UnitKind::Time,
            Unit::MinutesPerKilometer | Unit::MinutesPerMile => UnitKind::Pace,
            Unit::Percent => UnitKind::Ratio,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Meters => "m",
            Unit::Kilometers => "km",
            Unit::Miles => "mi",
            Unit::Feet => "ft",
            Unit::Seconds => "s",
            Unit::Minutes => "min",
            Unit::MinutesPerKilometer => "min/km",
            Unit::MinutesPerMile => "min/mi",
            Unit::Percent => "%",
        }
    }

    pub fn is_compatible_with(&self, other: Unit) -> bool {
        self.kind() == other.kind()
    }

    /// Convert a value in this unit to the base unit of its kind
    /// (meters, seconds, minutes per kilometer, percent).
    fn to_base(self, value: Decimal) -> Decimal {
        match self {
            Unit::Meters | Unit::Seconds | Unit::MinutesPerKilometer | Unit::Percent => value,
            Unit::Kilometers => value * METERS_PER_KILOMETER,
            Unit::Miles => value * METERS_PER_MILE,
            Unit::Feet => value * METERS_PER_FOOT,
            Unit::Minutes => value * SECONDS_PER_MINUTE,
            Unit::MinutesPerMile => value / KILOMETERS_PER_MILE,
        }
    }

    fn from_base(self, value: Decimal) -> Decimal {
        match self {
            Unit::Meters | Unit::Seconds | Unit::MinutesPerKilometer | Unit::Percent => value,
            Unit::Kilometers => value / METERS_PER_KILOMETER,
            Unit::Miles => value / METERS_PER_MILE,
            Unit::Feet => value / METERS_PER_FOOT,
            Unit::Minutes => value / SECONDS_PER_MINUTE,
            Unit::MinutesPerMile => value * KILOMETERS_PER_MILE,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A numeric measurement tagged with its unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quantity {
    pub value: Decimal,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(value: Decimal, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub fn zero(unit: Unit) -> Self {
        Self::new(Decimal::ZERO, unit)
    }

    pub fn meters(value: Decimal) -> Self {
        Self::new(value, Unit::Meters)
    }

    pub fn seconds(value: Decimal) -> Self {
        Self::new(value, Unit::Seconds)
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Re-express this quantity in another unit of the same kind
    pub fn convert_to(&self, unit: Unit) -> Result<Quantity, QuantityError> {
        if self.unit == unit {
            return Ok(*self);
        }
        if !self.unit.is_compatible_with(unit) {
            return Err(QuantityError::IncompatibleUnits {
                from: self.unit,
                to: unit,
            });
        }
        Ok(Quantity::new(unit.from_base(self.unit.to_base(self.value)), unit))
    }

    /// Numeric value of this quantity expressed in `unit`
    pub fn value_in(&self, unit: Unit) -> Result<Decimal, QuantityError> {
        self.convert_to(unit).map(|q| q.value)
    }

    /// Sum two quantities, keeping the unit of `self`
    pub fn checked_add(&self, other: &Quantity) -> Result<Quantity, QuantityError> {
        let rhs = other.value_in(self.unit)?;
        let value = self.value.checked_add(rhs).ok_or_else(|| QuantityError::Overflow {
            operation: "add".to_string(),
        })?;
        Ok(Quantity::new(value, self.unit))
    }

    /// Difference `self - other`, keeping the unit of `self`
    pub fn checked_sub(&self, other: &Quantity) -> Result<Quantity, QuantityError> {
        let rhs = other.value_in(self.unit)?;
        let value = self.value.checked_sub(rhs).ok_or_else(|| QuantityError::Overflow {
            operation: "subtract".to_string(),
        })?;
        Ok(Quantity::new(value, self.unit))
    }

    /// Absolute difference, keeping the unit of `self`
    pub fn abs_diff(&self, other: &Quantity) -> Result<Quantity, QuantityError> {
        self.checked_sub(other).map(|q| Quantity::new(q.value.abs(), q.unit))
    }

    /// Share of `total` this quantity represents, as a percentage.
    /// A zero total yields zero rather than an error.
    pub fn percentage_of(&self, total: &Quantity) -> Result<Decimal, QuantityError> {
        let total_value = total.value_in(self.unit)?;
        if total_value.is_zero() {
            return Ok(Decimal::ZERO);
        }
        Ok(self.value / total_value * dec!(100))
    }

    /// Divide by a plain count (used for averages)
    pub fn divided_by(&self, count: usize) -> Result<Quantity, QuantityError> {
        if count == 0 {
            return Err(QuantityError::DivisionByZero {
                operation: format!("average of {}", self.unit),
            });
        }
        Ok(Quantity::new(self.value / Decimal::from(count), self.unit))
    }

    /// Sum any number of quantities into `unit`
    pub fn sum<'a, I>(quantities: I, unit: Unit) -> Result<Quantity, QuantityError>
    where
        I: IntoIterator<Item = &'a Quantity>,
    {
        quantities
            .into_iter()
            .try_fold(Quantity::zero(unit), |acc, q| acc.checked_add(q))
    }

    /// Pace (time per distance) from a duration and a distance.
    ///
    /// Returns `Ok(None)` when the distance is zero, since pace is undefined.
    pub fn pace_from(
        duration: &Quantity,
        distance: &Quantity,
        pace_unit: Unit,
    ) -> Result<Option<Quantity>, QuantityError> {
        let distance_unit = match pace_unit {
            Unit::MinutesPerKilometer => Unit::Kilometers,
            Unit::MinutesPerMile => Unit::Miles,
            other => {
                return Err(QuantityError::IncompatibleUnits {
                    from: duration.unit,
                    to: other,
                })
            }
        };

        let minutes = duration.value_in(Unit::Minutes)?;
        let span = distance.value_in(distance_unit)?;
        if span <= Decimal::ZERO {
            return Ok(None);
        }
        Ok(Some(Quantity::new(minutes / span, pace_unit)))
    }

    /// Lossy conversion for statistical work
    pub fn to_f64(&self) -> f64 {
        self.value.to_f64().unwrap_or(0.0)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value.round_dp(2).normalize(), self.unit)
    }
}
