// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! The simulated Modbus driver plugin.
//!
//! Implements the full driver surface against the in-process register
//! bank: tag validation, per-group polling with a compiled read plan,
//! endianness-aware decoding, and single/batch writes.

use async_trait::async_trait;

use gridlink_core::address::{
    decode_f32, decode_f64, decode_u16, decode_u32, decode_u64, encode_f32, encode_f64,
    encode_u16, encode_u32, encode_u64, string_order, AddressOption, StringMode,
};
use gridlink_core::error::ErrorCode;
use gridlink_core::plugin::{DriverPlugin, Plugin, PluginEnv, PluginGroup};
use gridlink_core::tag::{Tag, TagValue};
use gridlink_core::types::{LinkState, TagType, Value};

use crate::device::{Area, SimDevice};
use crate::point::Point;

// =============================================================================
// Read Plan
// =============================================================================

struct PlanEntry {
    tag: Tag,
    point: Point,
    option: AddressOption,
}

fn compile_plan(tags: &[Tag]) -> Vec<PlanEntry> {
    let mut plan = Vec::with_capacity(tags.len());
    for tag in tags {
        let Ok(point) = Point::parse(&tag.address) else {
            continue;
        };
        let Ok(option) = tag.parse_address_option() else {
            continue;
        };
        plan.push(PlanEntry {
            tag: tag.clone(),
            point,
            option,
        });
    }
    plan
}

/// Number of 16-bit cells one tag occupies.
fn cell_count(tag_type: TagType, option: &AddressOption) -> u16 {
    match option {
        AddressOption::String { length, mode } => match mode {
            StringMode::LowOnly => *length,
            _ => length.div_ceil(2),
        },
        AddressOption::Bytes { length } => (*length as u16).div_ceil(2),
        _ => {
            if tag_type.is_32bit() {
                2
            } else if tag_type.is_64bit() {
                4
            } else {
                1
            }
        }
    }
}

fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for word in words {
        bytes.extend_from_slice(&word.to_be_bytes());
    }
    bytes
}

fn bytes_to_words(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], *pair.get(1).unwrap_or(&0)]))
        .collect()
}

// =============================================================================
// Driver
// =============================================================================

/// Driver plugin over the simulated register bank.
pub struct ModbusSimDriver {
    env: Option<PluginEnv>,
    device: SimDevice,
}

impl ModbusSimDriver {
    /// Creates a driver reading and writing `device`.
    pub fn new(device: SimDevice) -> Self {
        Self { env: None, device }
    }

    fn decode(&self, entry: &PlanEntry) -> Result<Value, ErrorCode> {
        let PlanEntry { tag, point, option } = entry;
        let cells = cell_count(tag.tag_type, option);

        match tag.tag_type {
            TagType::Bit => {
                if point.area.is_bit() {
                    let bit = self.device.read_bit(point.slave, point.area, point.offset);
                    Ok(Value::Bit(bit as u8))
                } else {
                    let word =
                        self.device
                            .read_words(point.slave, point.area, point.offset, 1)[0];
                    let index = match option {
                        AddressOption::Bit { bit } => bit.unwrap_or(0),
                        _ => 0,
                    };
                    Ok(Value::Bit(((word >> index) & 1) as u8))
                }
            }
            TagType::Bool => {
                if point.area.is_bit() {
                    let bit = self.device.read_bit(point.slave, point.area, point.offset);
                    Ok(Value::Bool(bit))
                } else {
                    let word =
                        self.device
                            .read_words(point.slave, point.area, point.offset, 1)[0];
                    Ok(Value::Bool(word != 0))
                }
            }
            TagType::Int8 => {
                let word = self.device.read_words(point.slave, point.area, point.offset, 1)[0];
                Ok(Value::Int8((word & 0xff) as i8))
            }
            TagType::Uint8 => {
                let word = self.device.read_words(point.slave, point.area, point.offset, 1)[0];
                Ok(Value::Uint8((word & 0xff) as u8))
            }
            t if t.is_16bit() => {
                let word = self.device.read_words(point.slave, point.area, point.offset, 1)[0];
                let endian = match option {
                    AddressOption::Endian16(e) => *e,
                    _ => Default::default(),
                };
                let raw = decode_u16(word.to_be_bytes(), endian);
                match t {
                    TagType::Int16 => Ok(Value::Int16(raw as i16)),
                    _ => Ok(Value::Uint16(raw)),
                }
            }
            t if t.is_32bit() => {
                let words =
                    self.device
                        .read_words(point.slave, point.area, point.offset, cells);
                let bytes: [u8; 4] = words_to_bytes(&words)
                    .try_into()
                    .map_err(|_| ErrorCode::Internal)?;
                let endian = match option {
                    AddressOption::Endian32(e) => *e,
                    _ => Default::default(),
                };
                match t {
                    TagType::Float => Ok(Value::Float(decode_f32(bytes, endian))),
                    TagType::Int32 => Ok(Value::Int32(decode_u32(bytes, endian) as i32)),
                    _ => Ok(Value::Uint32(decode_u32(bytes, endian))),
                }
            }
            t if t.is_64bit() => {
                let words =
                    self.device
                        .read_words(point.slave, point.area, point.offset, cells);
                let bytes: [u8; 8] = words_to_bytes(&words)
                    .try_into()
                    .map_err(|_| ErrorCode::Internal)?;
                let endian = match option {
                    AddressOption::Endian64(e) => *e,
                    _ => Default::default(),
                };
                match t {
                    TagType::Double => Ok(Value::Double(decode_f64(bytes, endian))),
                    TagType::Int64 => Ok(Value::Int64(decode_u64(bytes, endian) as i64)),
                    _ => Ok(Value::Uint64(decode_u64(bytes, endian))),
                }
            }
            TagType::String => {
                let AddressOption::String { length, mode } = option else {
                    return Err(ErrorCode::Internal);
                };
                let words =
                    self.device
                        .read_words(point.slave, point.area, point.offset, cells);
                let mut bytes = words_to_bytes(&words);
                match mode {
                    StringMode::High => {}
                    StringMode::Low => string_order::swap_pairs(&mut bytes),
                    StringMode::LowOnly => bytes = string_order::compress_low(&bytes),
                }
                bytes.truncate(*length as usize);
                if let Some(nul) = bytes.iter().position(|b| *b == 0) {
                    bytes.truncate(nul);
                }
                let text = String::from_utf8(bytes).map_err(|_| ErrorCode::Internal)?;
                Ok(Value::Str(text))
            }
            TagType::Bytes => {
                let AddressOption::Bytes { length } = option else {
                    return Err(ErrorCode::Internal);
                };
                let words =
                    self.device
                        .read_words(point.slave, point.area, point.offset, cells);
                let mut bytes = words_to_bytes(&words);
                bytes.truncate(*length as usize);
                Ok(Value::Bytes(bytes))
            }
            _ => Err(ErrorCode::Internal),
        }
    }

    fn encode(&self, tag: &Tag, value: &Value) -> Result<(), ErrorCode> {
        let point = Point::parse(&tag.address).map_err(|_| ErrorCode::Internal)?;
        if !point.area.is_writable() {
            return Err(ErrorCode::Internal);
        }
        let option = tag.parse_address_option().map_err(|_| ErrorCode::Internal)?;

        match (tag.tag_type, value) {
            (TagType::Bit, Value::Bit(v)) => {
                if point.area.is_bit() {
                    self.device.write_bit(point.slave, point.area, point.offset, *v != 0);
                } else {
                    let index = match option {
                        AddressOption::Bit { bit } => bit.unwrap_or(0),
                        _ => 0,
                    };
                    let word =
                        self.device
                            .read_words(point.slave, point.area, point.offset, 1)[0];
                    let word = if *v != 0 {
                        word | (1 << index)
                    } else {
                        word & !(1 << index)
                    };
                    self.device
                        .write_words(point.slave, point.area, point.offset, &[word]);
                }
                Ok(())
            }
            (TagType::Bool, Value::Bool(v)) => {
                if point.area.is_bit() {
                    self.device.write_bit(point.slave, point.area, point.offset, *v);
                } else {
                    self.device
                        .write_words(point.slave, point.area, point.offset, &[*v as u16]);
                }
                Ok(())
            }
            (TagType::Int8, Value::Int8(v)) => {
                self.device
                    .write_words(point.slave, point.area, point.offset, &[*v as u8 as u16]);
                Ok(())
            }
            (TagType::Uint8, Value::Uint8(v)) => {
                self.device
                    .write_words(point.slave, point.area, point.offset, &[*v as u16]);
                Ok(())
            }
            (t, value) if t.is_16bit() => {
                let endian = match option {
                    AddressOption::Endian16(e) => e,
                    _ => Default::default(),
                };
                let raw = match value {
                    Value::Int16(v) => *v as u16,
                    Value::Uint16(v) => *v,
                    _ => return Err(ErrorCode::Internal),
                };
                let word = u16::from_be_bytes(encode_u16(raw, endian));
                self.device
                    .write_words(point.slave, point.area, point.offset, &[word]);
                Ok(())
            }
            (t, value) if t.is_32bit() => {
                let endian = match option {
                    AddressOption::Endian32(e) => e,
                    _ => Default::default(),
                };
                let bytes = match value {
                    Value::Float(v) => encode_f32(*v, endian),
                    Value::Int32(v) => encode_u32(*v as u32, endian),
                    Value::Uint32(v) => encode_u32(*v, endian),
                    _ => return Err(ErrorCode::Internal),
                };
                self.device.write_words(
                    point.slave,
                    point.area,
                    point.offset,
                    &bytes_to_words(&bytes),
                );
                Ok(())
            }
            (t, value) if t.is_64bit() => {
                let endian = match option {
                    AddressOption::Endian64(e) => e,
                    _ => Default::default(),
                };
                let bytes = match value {
                    Value::Double(v) => encode_f64(*v, endian),
                    Value::Int64(v) => encode_u64(*v as u64, endian),
                    Value::Uint64(v) => encode_u64(*v, endian),
                    _ => return Err(ErrorCode::Internal),
                };
                self.device.write_words(
                    point.slave,
                    point.area,
                    point.offset,
                    &bytes_to_words(&bytes),
                );
                Ok(())
            }
            (TagType::String, Value::Str(text)) => {
                let AddressOption::String { length, mode } = option else {
                    return Err(ErrorCode::Internal);
                };
                let mut src = text.as_bytes().to_vec();
                src.truncate(length as usize);
                let bytes = match mode {
                    StringMode::High => {
                        let mut bytes = src;
                        bytes.resize((length as usize).div_ceil(2) * 2, 0);
                        bytes
                    }
                    StringMode::Low => {
                        let mut bytes = src;
                        bytes.resize((length as usize).div_ceil(2) * 2, 0);
                        string_order::swap_pairs(&mut bytes);
                        bytes
                    }
                    StringMode::LowOnly => {
                        let mut buf = vec![0u8; src.len() * 2];
                        string_order::expand_low(&src, &mut buf)
                            .map_err(|_| ErrorCode::Internal)?;
                        buf.resize(length as usize * 2, 0);
                        buf
                    }
                };
                self.device.write_words(
                    point.slave,
                    point.area,
                    point.offset,
                    &bytes_to_words(&bytes),
                );
                Ok(())
            }
            (TagType::Bytes, Value::Bytes(data)) => {
                let AddressOption::Bytes { length } = option else {
                    return Err(ErrorCode::Internal);
                };
                let mut bytes = data.clone();
                bytes.resize(length as usize, 0);
                self.device.write_words(
                    point.slave,
                    point.area,
                    point.offset,
                    &bytes_to_words(&bytes),
                );
                Ok(())
            }
            _ => Err(ErrorCode::Internal),
        }
    }
}

#[async_trait]
impl Plugin for ModbusSimDriver {
    async fn init(&mut self, env: PluginEnv, _load: bool) -> Result<(), ErrorCode> {
        self.env = Some(env);
        Ok(())
    }

    async fn uninit(&mut self) -> Result<(), ErrorCode> {
        if let Some(env) = &self.env {
            env.set_link_state(LinkState::Disconnected);
        }
        self.env = None;
        Ok(())
    }

    async fn start(&mut self) -> Result<(), ErrorCode> {
        if let Some(env) = &self.env {
            env.set_link_state(LinkState::Connected);
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ErrorCode> {
        if let Some(env) = &self.env {
            env.set_link_state(LinkState::Disconnected);
        }
        Ok(())
    }

    async fn setting(&mut self, setting: &str) -> Result<(), ErrorCode> {
        // The blob is opaque to the core; this driver only requires JSON.
        serde_json::from_str::<serde_json::Value>(setting)
            .map(|_| ())
            .map_err(|_| ErrorCode::Internal)
    }
}

#[async_trait]
impl DriverPlugin for ModbusSimDriver {
    fn validate_tag(&self, tag: &Tag) -> Result<(), ErrorCode> {
        Point::parse(&tag.address).map_err(|_| ErrorCode::Internal)?;
        tag.parse_address_option().map_err(|_| ErrorCode::Internal)?;
        Ok(())
    }

    async fn group_sync(&mut self, group: &mut PluginGroup) -> Result<(), ErrorCode> {
        group.user_data = Some(Box::new(compile_plan(&group.tags)));
        Ok(())
    }

    async fn group_timer(&mut self, group: &mut PluginGroup) -> Result<Vec<TagValue>, ErrorCode> {
        if group.user_data.is_none() {
            group.user_data = Some(Box::new(compile_plan(&group.tags)));
        }
        let plan = group
            .user_data
            .as_ref()
            .and_then(|data| data.downcast_ref::<Vec<PlanEntry>>())
            .ok_or(ErrorCode::Internal)?;

        let mut values = Vec::with_capacity(plan.len());
        for entry in plan {
            match self.decode(entry) {
                Ok(value) => values.push(TagValue::new(entry.tag.name.clone(), value)),
                Err(code) => {
                    tracing::debug!(tag = %entry.tag.name, %code, "skipping unreadable tag");
                }
            }
        }
        Ok(values)
    }

    async fn write_tag(&mut self, tag: &Tag, value: Value) -> ErrorCode {
        match self.encode(tag, &value) {
            Ok(()) => ErrorCode::Success,
            Err(code) => code,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use gridlink_core::types::Attribute;

    fn tag(name: &str, address: &str, tag_type: TagType) -> Tag {
        Tag::new(name, address, Attribute::READ | Attribute::WRITE, tag_type)
    }

    fn group_of(tags: Vec<Tag>) -> PluginGroup {
        PluginGroup::new("g1", tags, 1000)
    }

    async fn read_single(driver: &mut ModbusSimDriver, t: Tag) -> Value {
        let mut group = group_of(vec![t]);
        let values = driver.group_timer(&mut group).await.unwrap();
        assert_eq!(values.len(), 1);
        values[0].value.clone()
    }

    #[tokio::test]
    async fn test_int16_read() {
        let device = SimDevice::new();
        device.write_words(1, Area::HoldingRegister, 0, &[0x0102]);
        let mut driver = ModbusSimDriver::new(device);

        // Default 16-bit endianness is little.
        let value = read_single(&mut driver, tag("t", "1!400001", TagType::Int16)).await;
        assert_eq!(value, Value::Int16(0x0201));

        let value = read_single(&mut driver, tag("t", "1!400001#B", TagType::Int16)).await;
        assert_eq!(value, Value::Int16(0x0102));
    }

    #[tokio::test]
    async fn test_write_then_read_all_endians() {
        for suffix in ["#BB", "#BL", "#LL", "#LB"] {
            let mut driver = ModbusSimDriver::new(SimDevice::new());
            let t = tag("f", &format!("1!400010{}", suffix), TagType::Float);

            let code = driver.write_tag(&t, Value::Float(-12.5)).await;
            assert_eq!(code, ErrorCode::Success);

            let value = read_single(&mut driver, t).await;
            assert_eq!(value, Value::Float(-12.5), "endian {}", suffix);
        }
    }

    #[tokio::test]
    async fn test_double_roundtrip() {
        for suffix in ["", "#B", "#L"] {
            let mut driver = ModbusSimDriver::new(SimDevice::new());
            let t = tag("d", &format!("1!400020{}", suffix), TagType::Double);
            assert_eq!(
                driver.write_tag(&t, Value::Double(2.25)).await,
                ErrorCode::Success
            );
            assert_eq!(read_single(&mut driver, t).await, Value::Double(2.25));
        }
    }

    #[tokio::test]
    async fn test_string_modes_roundtrip() {
        for mode in ["H", "L", "D", "E"] {
            let mut driver = ModbusSimDriver::new(SimDevice::new());
            let t = tag("s", &format!("1!400030.8{}", mode), TagType::String);
            assert_eq!(
                driver.write_tag(&t, Value::Str("pump".into())).await,
                ErrorCode::Success,
                "mode {}",
                mode
            );
            assert_eq!(
                read_single(&mut driver, t).await,
                Value::Str("pump".into()),
                "mode {}",
                mode
            );
        }
    }

    #[tokio::test]
    async fn test_bit_and_bool() {
        let device = SimDevice::new();
        device.write_words(1, Area::HoldingRegister, 0, &[0b1000]);
        device.write_bit(1, Area::Coil, 1, true);
        let mut driver = ModbusSimDriver::new(device);

        let value = read_single(&mut driver, tag("b", "1!400001.3", TagType::Bit)).await;
        assert_eq!(value, Value::Bit(1));

        let value = read_single(&mut driver, tag("c", "1!000002", TagType::Bool)).await;
        assert_eq!(value, Value::Bool(true));
    }

    #[tokio::test]
    async fn test_write_readonly_area_rejected() {
        let mut driver = ModbusSimDriver::new(SimDevice::new());
        let t = tag("i", "1!300001", TagType::Int16);
        assert_eq!(
            driver.write_tag(&t, Value::Int16(5)).await,
            ErrorCode::Internal
        );
    }

    #[tokio::test]
    async fn test_validate_tag() {
        let driver = ModbusSimDriver::new(SimDevice::new());
        assert!(driver.validate_tag(&tag("t", "1!400001", TagType::Int16)).is_ok());
        assert!(driver.validate_tag(&tag("t", "nonsense", TagType::Int16)).is_err());
        // STRING requires a length suffix.
        assert!(driver.validate_tag(&tag("t", "1!400001", TagType::String)).is_err());
    }

    #[tokio::test]
    async fn test_plan_skips_bad_tags() {
        let device = SimDevice::new();
        device.write_words(1, Area::HoldingRegister, 0, &[7]);
        let mut driver = ModbusSimDriver::new(device);
        let mut group = group_of(vec![
            tag("good", "1!400001#B", TagType::Uint16),
            tag("bad", "oops", TagType::Uint16),
        ]);
        let values = driver.group_timer(&mut group).await.unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].tag, "good");
    }

    #[tokio::test]
    async fn test_bytes_roundtrip() {
        let mut driver = ModbusSimDriver::new(SimDevice::new());
        let t = tag("raw", "1!400040.4", TagType::Bytes);
        assert_eq!(
            driver.write_tag(&t, Value::Bytes(vec![1, 2, 3, 4])).await,
            ErrorCode::Success
        );
        assert_eq!(
            read_single(&mut driver, t).await,
            Value::Bytes(vec![1, 2, 3, 4])
        );
    }
}
