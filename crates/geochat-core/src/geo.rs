//! Grid keys for geographic channels.
//!
//! A coordinate is snapped to a fixed-precision grid by rounding the exact
//! binary value of each component half-away-from-zero, the same digits a
//! fixed-point decimal formatter prints. All coordinates that land in the
//! same cell share a channel. At the default precision of 3 decimal places a cell is
//! roughly 110 m tall.

use crate::channel::ChannelId;
use std::fmt;
use thiserror::Error;

/// Default number of decimal places kept in a grid key.
pub const DEFAULT_PRECISION: u32 = 3;

/// Largest supported precision.
pub const MAX_PRECISION: u32 = 6;

/// Coordinate validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    /// Latitude is not a finite number in [-90, 90].
    #[error("Latitude out of range: {0}")]
    InvalidLatitude(f64),

    /// Longitude is not a finite number in [-180, 180].
    #[error("Longitude out of range: {0}")]
    InvalidLongitude(f64),

    /// Grid precision above [`MAX_PRECISION`].
    #[error("Grid precision {0} exceeds maximum {MAX_PRECISION}")]
    InvalidPrecision(u32),
}

/// A validated position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    /// Create a coordinate.
    ///
    /// # Errors
    ///
    /// Returns an error if either component is NaN, infinite, or out of range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(GeoError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(GeoError::InvalidLongitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Latitude in degrees.
    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// A grid cell, stored as integer multiples of `10^-precision` degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridCell {
    lat: i64,
    lon: i64,
    precision: u32,
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_fixed(f, self.lat, self.precision)?;
        f.write_str(":")?;
        write_fixed(f, self.lon, self.precision)
    }
}

/// Print `units * 10^-precision` with exactly `precision` fractional digits.
///
/// Works on the integer so that zero never prints as `-0.000`.
fn write_fixed(f: &mut fmt::Formatter<'_>, units: i64, precision: u32) -> fmt::Result {
    let sign = if units < 0 { "-" } else { "" };
    let abs = units.unsigned_abs();
    if precision == 0 {
        return write!(f, "{sign}{abs}");
    }
    let scale = 10_u64.pow(precision);
    write!(
        f,
        "{sign}{}.{:0width$}",
        abs / scale,
        abs % scale,
        width = precision as usize
    )
}

/// Round `value * 10^precision` to whole grid units.
///
/// The product is never formed in floating point. The exact binary value
/// `mantissa * 2^exp` is scaled in integers and compared against the
/// midpoint, so `0.0055` (stored just below the tie) rounds down while an
/// exact tie such as `2.5` rounds away from zero.
fn round_units(value: f64, scale: u64) -> i64 {
    const MANTISSA_BITS: u32 = 52;
    let bits = value.abs().to_bits();
    let biased = ((bits >> MANTISSA_BITS) & 0x7ff) as i32;
    let fraction = bits & ((1 << MANTISSA_BITS) - 1);
    let (mantissa, exp) = if biased == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1 << MANTISSA_BITS), biased - 1075)
    };

    let scaled = u128::from(mantissa) * u128::from(scale);
    let magnitude = if exp >= 0 {
        scaled << exp
    } else {
        let shift = exp.unsigned_abs();
        // Below 2^-27 grid units.
        if shift >= 100 {
            0
        } else {
            let whole = scaled >> shift;
            let rest = scaled - (whole << shift);
            if rest >= 1 << (shift - 1) {
                whole + 1
            } else {
                whole
            }
        }
    };

    let units = i64::try_from(magnitude).unwrap_or(i64::MAX);
    if value.is_sign_negative() {
        -units
    } else {
        units
    }
}

/// Maps coordinates to channel identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoGrid {
    precision: u32,
    scale: u64,
}

impl GeoGrid {
    /// Create a grid keeping `precision` decimal places.
    ///
    /// # Errors
    ///
    /// Returns an error if `precision` exceeds [`MAX_PRECISION`].
    pub fn new(precision: u32) -> Result<Self, GeoError> {
        if precision > MAX_PRECISION {
            return Err(GeoError::InvalidPrecision(precision));
        }
        Ok(Self {
            precision,
            scale: 10_u64.pow(precision),
        })
    }

    /// Number of decimal places kept.
    #[must_use]
    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// The cell containing `coord`.
    #[must_use]
    pub fn cell(&self, coord: &Coordinate) -> GridCell {
        GridCell {
            lat: round_units(coord.latitude, self.scale),
            lon: round_units(coord.longitude, self.scale),
            precision: self.precision,
        }
    }

    /// The channel identifier for `coord`, formatted `"<lat>:<lon>"`.
    #[must_use]
    pub fn key(&self, coord: &Coordinate) -> ChannelId {
        self.cell(coord).to_string()
    }
}

impl Default for GeoGrid {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            scale: 10_u64.pow(DEFAULT_PRECISION),
        }
    }
}

/// Channel identifier for `coord` at the default precision.
#[must_use]
pub fn key(coord: &Coordinate) -> ChannelId {
    GeoGrid::default().key(coord)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    #[test]
    fn test_key_format() {
        assert_eq!(key(&coord(37.7749, -122.4194)), "37.775:-122.419");
        assert_eq!(key(&coord(0.0, 0.0)), "0.000:0.000");
        assert_eq!(key(&coord(-90.0, 180.0)), "-90.000:180.000");
        assert_eq!(key(&coord(5.1, -0.02)), "5.100:-0.020");
    }

    #[test]
    fn test_nearby_coordinates_collide() {
        let a = coord(37.774900, -122.419400);
        let b = coord(37.774901, -122.419401);
        assert_eq!(key(&a), key(&b));
        assert_ne!(key(&a), key(&coord(37.7760, -122.4194)));
    }

    #[test]
    fn test_rounds_half_away_from_zero() {
        assert_eq!(key(&coord(0.0005, -0.0005)), "0.001:-0.001");
        assert_eq!(key(&coord(2.5, -2.5)), "2.500:-2.500");
        assert_eq!(key(&coord(0.0625, -0.0625)), "0.063:-0.063");
    }

    #[test]
    fn test_rounds_stored_value_not_decimal_literal() {
        // Both literals sit just below their midpoint once stored as f64.
        assert_eq!(key(&coord(0.0055, -0.0055)), "0.005:-0.005");
        assert_eq!(key(&coord(1.0005, -1.0005)), "1.000:-1.000");
        assert_eq!(GeoGrid::new(1).unwrap().key(&coord(0.15, 0.25)), "0.1:0.3");
    }

    #[test]
    fn test_negative_zero_normalized() {
        assert_eq!(key(&coord(-0.0001, -0.0004)), "0.000:0.000");
        assert_eq!(key(&coord(-0.0, 0.0)), "0.000:0.000");
    }

    #[test]
    fn test_key_matches_cell_equality() {
        let samples = [
            (12.3454, 45.6781),
            (12.3456, 45.6784),
            (12.3449, 45.6776),
            (-12.3454, -45.6781),
            (-12.3456, -45.6779),
        ];
        let grid = GeoGrid::default();
        for &(lat_a, lon_a) in &samples {
            for &(lat_b, lon_b) in &samples {
                let (a, b) = (coord(lat_a, lon_a), coord(lat_b, lon_b));
                assert_eq!(grid.key(&a) == grid.key(&b), grid.cell(&a) == grid.cell(&b));
            }
        }
    }

    #[test]
    fn test_custom_precision() {
        let c = coord(37.7749, -122.4194);
        assert_eq!(GeoGrid::new(0).unwrap().key(&c), "38:-122");
        assert_eq!(GeoGrid::new(1).unwrap().key(&c), "37.8:-122.4");
        assert_eq!(GeoGrid::new(5).unwrap().key(&c), "37.77490:-122.41940");
        assert_eq!(GeoGrid::new(7), Err(GeoError::InvalidPrecision(7)));
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(90.0, -180.0).is_ok());
        assert!(matches!(
            Coordinate::new(90.5, 0.0),
            Err(GeoError::InvalidLatitude(_))
        ));
        assert!(matches!(
            Coordinate::new(0.0, 180.01),
            Err(GeoError::InvalidLongitude(_))
        ));
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::INFINITY).is_err());
    }
}
