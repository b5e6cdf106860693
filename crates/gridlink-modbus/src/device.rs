// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! The simulated Modbus device: a thread-safe register bank.
//!
//! Real PDU framing is out of scope for this driver; the bank exposes the
//! four Modbus data areas so the polling, conversion and write paths can be
//! exercised end to end. Tests hold a clone of the [`SimDevice`] handle and
//! poke registers directly.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Modbus data areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Area {
    /// Coils (0x).
    Coil,
    /// Discrete inputs (1x).
    DiscreteInput,
    /// Input registers (3x).
    InputRegister,
    /// Holding registers (4x).
    HoldingRegister,
}

impl Area {
    /// Maps the leading digit of a point number to its area.
    pub fn from_digit(digit: u32) -> Option<Area> {
        match digit {
            0 => Some(Area::Coil),
            1 => Some(Area::DiscreteInput),
            3 => Some(Area::InputRegister),
            4 => Some(Area::HoldingRegister),
            _ => None,
        }
    }

    /// Returns `true` for the bit-addressed areas.
    #[inline]
    pub fn is_bit(&self) -> bool {
        matches!(self, Area::Coil | Area::DiscreteInput)
    }

    /// Returns `true` for writable areas.
    #[inline]
    pub fn is_writable(&self) -> bool {
        matches!(self, Area::Coil | Area::HoldingRegister)
    }
}

#[derive(Debug, Default)]
struct Bank {
    words: HashMap<(u8, Area, u16), u16>,
    bits: HashMap<(u8, Area, u16), bool>,
}

/// A cloneable handle to the simulated device.
#[derive(Debug, Clone, Default)]
pub struct SimDevice {
    bank: Arc<Mutex<Bank>>,
}

impl SimDevice {
    /// Creates an empty device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `count` consecutive words. Unwritten cells read as zero.
    pub fn read_words(&self, slave: u8, area: Area, offset: u16, count: u16) -> Vec<u16> {
        let bank = self.bank.lock();
        (0..count)
            .map(|i| {
                bank.words
                    .get(&(slave, area, offset.wrapping_add(i)))
                    .copied()
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Writes consecutive words.
    pub fn write_words(&self, slave: u8, area: Area, offset: u16, words: &[u16]) {
        let mut bank = self.bank.lock();
        for (i, word) in words.iter().enumerate() {
            bank.words
                .insert((slave, area, offset.wrapping_add(i as u16)), *word);
        }
    }

    /// Reads one bit cell.
    pub fn read_bit(&self, slave: u8, area: Area, offset: u16) -> bool {
        self.bank
            .lock()
            .bits
            .get(&(slave, area, offset))
            .copied()
            .unwrap_or(false)
    }

    /// Writes one bit cell.
    pub fn write_bit(&self, slave: u8, area: Area, offset: u16, value: bool) {
        self.bank.lock().bits.insert((slave, area, offset), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_default_zero() {
        let device = SimDevice::new();
        assert_eq!(
            device.read_words(1, Area::HoldingRegister, 0, 3),
            vec![0, 0, 0]
        );
    }

    #[test]
    fn test_word_roundtrip() {
        let device = SimDevice::new();
        device.write_words(1, Area::HoldingRegister, 10, &[0x1234, 0x5678]);
        assert_eq!(
            device.read_words(1, Area::HoldingRegister, 10, 2),
            vec![0x1234, 0x5678]
        );
        // Other slaves and areas are independent.
        assert_eq!(device.read_words(2, Area::HoldingRegister, 10, 1), vec![0]);
        assert_eq!(device.read_words(1, Area::InputRegister, 10, 1), vec![0]);
    }

    #[test]
    fn test_bit_roundtrip() {
        let device = SimDevice::new();
        assert!(!device.read_bit(1, Area::Coil, 5));
        device.write_bit(1, Area::Coil, 5, true);
        assert!(device.read_bit(1, Area::Coil, 5));
    }

    #[test]
    fn test_area_from_digit() {
        assert_eq!(Area::from_digit(0), Some(Area::Coil));
        assert_eq!(Area::from_digit(4), Some(Area::HoldingRegister));
        assert_eq!(Area::from_digit(2), None);
        assert!(Area::Coil.is_bit());
        assert!(!Area::InputRegister.is_writable());
    }
}
