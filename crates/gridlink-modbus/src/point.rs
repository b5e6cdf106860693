// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! Modbus point addresses.
//!
//! A tag address reads `"<slave>!<point>"` where `point` is the classic
//! area-prefixed cell number: `400001` is the first holding register,
//! `300010` the tenth input register, `000003` the third coil. The core's
//! address-option suffix (`#LL`, `.20H`, …) follows the point number and
//! is parsed separately against the tag's declared type.

use thiserror::Error;

use crate::device::Area;

/// Point address parse errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PointError {
    /// The `!` separator is missing.
    #[error("address '{0}' is missing the slave separator")]
    MissingSeparator(String),

    /// The slave id is not a number in range.
    #[error("address '{0}' has an invalid slave id")]
    InvalidSlave(String),

    /// The point number is malformed or addresses an unknown area.
    #[error("address '{0}' has an invalid point number")]
    InvalidPoint(String),
}

/// A parsed Modbus point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    /// Slave (unit) id.
    pub slave: u8,
    /// Data area.
    pub area: Area,
    /// Zero-based cell offset within the area.
    pub offset: u16,
}

impl Point {
    /// Parses the point portion of a tag address, ignoring any trailing
    /// address-option suffix.
    pub fn parse(address: &str) -> Result<Point, PointError> {
        let (slave_part, rest) = address
            .split_once('!')
            .ok_or_else(|| PointError::MissingSeparator(address.to_string()))?;
        let slave: u8 = slave_part
            .parse()
            .map_err(|_| PointError::InvalidSlave(address.to_string()))?;

        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        let number: u32 = digits
            .parse()
            .map_err(|_| PointError::InvalidPoint(address.to_string()))?;

        let area = Area::from_digit(number / 100_000)
            .ok_or_else(|| PointError::InvalidPoint(address.to_string()))?;
        let cell = number % 100_000;
        if cell == 0 || cell > u16::MAX as u32 + 1 {
            return Err(PointError::InvalidPoint(address.to_string()));
        }
        Ok(Point {
            slave,
            area,
            offset: (cell - 1) as u16,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_holding_register() {
        let point = Point::parse("1!400001").unwrap();
        assert_eq!(
            point,
            Point {
                slave: 1,
                area: Area::HoldingRegister,
                offset: 0
            }
        );
    }

    #[test]
    fn test_parse_ignores_option_suffix() {
        let point = Point::parse("4!400010.20H").unwrap();
        assert_eq!(point.slave, 4);
        assert_eq!(point.offset, 9);

        let point = Point::parse("2!300005#BB").unwrap();
        assert_eq!(point.area, Area::InputRegister);
        assert_eq!(point.offset, 4);
    }

    #[test]
    fn test_parse_coil_and_discrete() {
        assert_eq!(Point::parse("1!000003").unwrap().area, Area::Coil);
        assert_eq!(
            Point::parse("1!100007").unwrap(),
            Point {
                slave: 1,
                area: Area::DiscreteInput,
                offset: 6
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Point::parse("400001"),
            Err(PointError::MissingSeparator(_))
        ));
        assert!(matches!(
            Point::parse("x!400001"),
            Err(PointError::InvalidSlave(_))
        ));
        assert!(matches!(
            Point::parse("1!200001"),
            Err(PointError::InvalidPoint(_))
        ));
        assert!(matches!(
            Point::parse("1!400000"),
            Err(PointError::InvalidPoint(_))
        ));
    }
}
