//! Unit-aware quantities for link configuration.
//!
//! Buffer sizes and link bandwidths are specified as strings with SI
//! prefixes ("16KB", "128b", "10Gb/s"). Everything is normalized to bits
//! internally. A quantity with an unrecognized unit is a fatal
//! configuration error: it indicates a misconfigured topology, so parsing
//! fails rather than guessing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::SimTime;

/// Errors produced while parsing a unit-bearing quantity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitError {
    #[error("empty quantity string")]
    Empty,

    #[error("invalid numeric value in quantity: {0}")]
    BadNumber(String),

    #[error("buffer size must be specified in bits or bytes: {0}")]
    BadSizeUnit(String),

    #[error("bandwidth must be specified in b/s or B/s: {0}")]
    BadBandwidthUnit(String),
}

/// Splits a quantity string into its numeric part and unit part.
fn split_quantity(s: &str) -> Result<(f64, &str), UnitError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(UnitError::Empty);
    }
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let value: f64 = num
        .parse()
        .map_err(|_| UnitError::BadNumber(s.to_string()))?;
    Ok((value, unit.trim()))
}

/// Returns the SI multiplier for a prefix character, if any.
fn si_multiplier(prefix: char) -> Option<f64> {
    match prefix {
        'k' | 'K' => Some(1e3),
        'M' => Some(1e6),
        'G' => Some(1e9),
        'T' => Some(1e12),
        _ => None,
    }
}

/// Parses a unit of the form `[prefix]b` or `[prefix]B` into a bit
/// multiplier.
fn bit_multiplier(unit: &str) -> Option<f64> {
    let mut chars = unit.chars();
    let first = chars.next()?;
    let rest: String = chars.collect();

    if rest.is_empty() {
        return match first {
            'b' => Some(1.0),
            'B' => Some(8.0),
            _ => None,
        };
    }

    let prefix = si_multiplier(first)?;
    match rest.as_str() {
        "b" => Some(prefix),
        "B" => Some(prefix * 8.0),
        _ => None,
    }
}

/// A buffer size, normalized to bits.
///
/// Accepted units: `b` (bits) or `B` (bytes), optionally with an SI prefix
/// (`k`/`K`, `M`, `G`, `T`). Anything else is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BufferSize {
    bits: u64,
}

impl BufferSize {
    /// Creates a buffer size from a raw bit count.
    pub fn from_bits(bits: u64) -> Self {
        Self { bits }
    }

    /// Returns the size in bits.
    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Parses a size string such as `"16KB"` or `"128b"`.
    pub fn parse(s: &str) -> Result<Self, UnitError> {
        let (value, unit) = split_quantity(s)?;
        let mult = bit_multiplier(unit).ok_or_else(|| UnitError::BadSizeUnit(s.to_string()))?;
        Ok(Self {
            bits: (value * mult).round() as u64,
        })
    }
}

impl FromStr for BufferSize {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BufferSize {
    type Error = UnitError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<BufferSize> for String {
    fn from(v: BufferSize) -> String {
        format!("{}b", v.bits)
    }
}

impl fmt::Display for BufferSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}b", self.bits)
    }
}

/// A link bandwidth, normalized to bits per second.
///
/// Accepted units: `b/s` or `B/s`, optionally with an SI prefix.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bandwidth {
    bits_per_sec: f64,
}

impl Bandwidth {
    /// Creates a bandwidth from raw bits per second.
    pub fn from_bits_per_sec(bits_per_sec: f64) -> Self {
        Self { bits_per_sec }
    }

    /// Returns the bandwidth in bits per second.
    pub fn bits_per_sec(&self) -> f64 {
        self.bits_per_sec
    }

    /// Parses a bandwidth string such as `"10Gb/s"` or `"1GB/s"`.
    pub fn parse(s: &str) -> Result<Self, UnitError> {
        let (value, unit) = split_quantity(s)?;
        let rate_unit = unit
            .strip_suffix("/s")
            .ok_or_else(|| UnitError::BadBandwidthUnit(s.to_string()))?;
        let mult =
            bit_multiplier(rate_unit).ok_or_else(|| UnitError::BadBandwidthUnit(s.to_string()))?;
        Ok(Self {
            bits_per_sec: value * mult,
        })
    }

    /// Returns the smaller of two bandwidths.
    ///
    /// Used during negotiation: the effective link speed is the minimum of
    /// the two advertised speeds.
    pub fn min(self, other: Bandwidth) -> Bandwidth {
        if other.bits_per_sec < self.bits_per_sec {
            other
        } else {
            self
        }
    }

    /// Returns the time to transmit `bits` at this bandwidth, in
    /// picoseconds.
    ///
    /// This is the period of the output arbiter's wake-up clock when `bits`
    /// is the flit size: one cycle per flit on the wire.
    pub fn transmission_time(&self, bits: u64) -> SimTime {
        ((bits as f64) * 1e12 / self.bits_per_sec).round() as SimTime
    }
}

impl FromStr for Bandwidth {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Bandwidth {
    type Error = UnitError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Bandwidth> for String {
    fn from(v: Bandwidth) -> String {
        format!("{}b/s", v.bits_per_sec)
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}b/s", self.bits_per_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_bits() {
        assert_eq!(BufferSize::parse("128b").unwrap().bits(), 128);
        assert_eq!(BufferSize::parse("1Kb").unwrap().bits(), 1_000);
    }

    #[test]
    fn test_buffer_size_bytes() {
        assert_eq!(BufferSize::parse("16B").unwrap().bits(), 128);
        assert_eq!(BufferSize::parse("2KB").unwrap().bits(), 16_000);
    }

    #[test]
    fn test_buffer_size_bad_unit_is_fatal() {
        assert!(matches!(
            BufferSize::parse("16flits"),
            Err(UnitError::BadSizeUnit(_))
        ));
        assert!(matches!(
            BufferSize::parse("16"),
            Err(UnitError::BadSizeUnit(_))
        ));
    }

    #[test]
    fn test_bandwidth_parse() {
        let bw = Bandwidth::parse("10Gb/s").unwrap();
        assert_eq!(bw.bits_per_sec(), 10e9);

        let bw = Bandwidth::parse("1GB/s").unwrap();
        assert_eq!(bw.bits_per_sec(), 8e9);
    }

    #[test]
    fn test_bandwidth_bad_unit() {
        assert!(Bandwidth::parse("10Gb").is_err());
        assert!(Bandwidth::parse("10Gx/s").is_err());
    }

    #[test]
    fn test_bandwidth_min() {
        let a = Bandwidth::parse("10Gb/s").unwrap();
        let b = Bandwidth::parse("8Gb/s").unwrap();
        assert_eq!(a.min(b), b);
        assert_eq!(b.min(a), b);
    }

    #[test]
    fn test_transmission_time() {
        // 64 bits at 8Gb/s = 8ns = 8000ps.
        let bw = Bandwidth::parse("8Gb/s").unwrap();
        assert_eq!(bw.transmission_time(64), 8_000);
    }

    #[test]
    fn test_serde_roundtrip() {
        let size: BufferSize = serde_yaml::from_str("\"4KB\"").unwrap();
        assert_eq!(size.bits(), 32_000);

        let bw: Bandwidth = serde_yaml::from_str("\"10Gb/s\"").unwrap();
        assert_eq!(bw.bits_per_sec(), 10e9);
    }
}
