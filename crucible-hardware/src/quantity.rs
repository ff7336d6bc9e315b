//! Unit-aware quantities for numeric hardware constraints

use crucible_core::SemanticError;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Recognized byte units: decimal SI and binary prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteUnit {
    B,
    KB,
    MB,
    GB,
    TB,
    KiB,
    MiB,
    GiB,
    TiB,
}

impl ByteUnit {
    pub fn multiplier(&self) -> u64 {
        match self {
            ByteUnit::B => 1,
            ByteUnit::KB => 1_000,
            ByteUnit::MB => 1_000_000,
            ByteUnit::GB => 1_000_000_000,
            ByteUnit::TB => 1_000_000_000_000,
            ByteUnit::KiB => 1 << 10,
            ByteUnit::MiB => 1 << 20,
            ByteUnit::GiB => 1 << 30,
            ByteUnit::TiB => 1 << 40,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ByteUnit::B => "B",
            ByteUnit::KB => "kB",
            ByteUnit::MB => "MB",
            ByteUnit::GB => "GB",
            ByteUnit::TB => "TB",
            ByteUnit::KiB => "KiB",
            ByteUnit::MiB => "MiB",
            ByteUnit::GiB => "GiB",
            ByteUnit::TiB => "TiB",
        }
    }

    fn parse(symbol: &str) -> Option<ByteUnit> {
        match symbol {
            "B" => Some(ByteUnit::B),
            "kB" | "KB" => Some(ByteUnit::KB),
            "MB" => Some(ByteUnit::MB),
            "GB" => Some(ByteUnit::GB),
            "TB" => Some(ByteUnit::TB),
            "KiB" => Some(ByteUnit::KiB),
            "MiB" => Some(ByteUnit::MiB),
            "GiB" => Some(ByteUnit::GiB),
            "TiB" => Some(ByteUnit::TiB),
            _ => None,
        }
    }
}

/// A numeric magnitude with an optional byte unit.
///
/// Dimensionless quantities (cpu core counts, raw byte numbers in
/// hardware descriptions) compare against byte quantities in base units:
/// `2147483648` equals `2 GiB`.
#[derive(Debug, Clone, Copy)]
pub struct Quantity {
    pub magnitude: f64,
    pub unit: Option<ByteUnit>,
}

impl Quantity {
    pub fn count(magnitude: f64) -> Self {
        Self {
            magnitude,
            unit: None,
        }
    }

    /// The magnitude normalized to base units (bytes, or the bare count).
    pub fn normalized(&self) -> f64 {
        match self.unit {
            Some(unit) => self.magnitude * unit.multiplier() as f64,
            None => self.magnitude,
        }
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.normalized().partial_cmp(&other.normalized())
    }
}

impl FromStr for Quantity {
    type Err = SemanticError;

    /// Parse `8 GB`, `2048MiB`, or a bare `4`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let split = text
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+'))
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        let (number, symbol) = text.split_at(split);
        let magnitude: f64 = number.trim().parse().map_err(|_| {
            SemanticError::InvalidConstraint {
                reason: format!("invalid quantity '{text}'"),
            }
        })?;
        let symbol = symbol.trim();
        let unit = if symbol.is_empty() {
            None
        } else {
            Some(
                ByteUnit::parse(symbol).ok_or_else(|| SemanticError::InvalidConstraint {
                    reason: format!("unknown unit '{symbol}' in '{text}'"),
                })?,
            )
        };
        Ok(Self { magnitude, unit })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.magnitude.fract() == 0.0 && self.magnitude.abs() < 1e15 {
            write!(f, "{}", self.magnitude as i64)?;
        } else {
            write!(f, "{}", self.magnitude)?;
        }
        if let Some(unit) = self.unit {
            write!(f, " {}", unit.symbol())?;
        }
        Ok(())
    }
}
