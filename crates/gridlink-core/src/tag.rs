// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! The tag entity: one addressable data point on a device.
//!
//! A tag is immutable after creation from the gateway's point of view; the
//! only mutable part is the static value of `STATIC` tags, which is an
//! explicit optional typed field rather than device data.

use serde::{Deserialize, Serialize};

use crate::address::{parse_address_option, AddressOption, AddressResult};
use crate::error::ErrorCode;
use crate::types::{Attribute, TagType, Value};

// =============================================================================
// Tag
// =============================================================================

/// Description of one readable/writable point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag name, unique within its group.
    pub name: String,

    /// Protocol-specific location string. The core only interprets the
    /// trailing address option.
    pub address: String,

    /// Attribute set.
    pub attribute: Attribute,

    /// Declared type.
    #[serde(rename = "type")]
    pub tag_type: TagType,

    /// Display precision hint.
    #[serde(default)]
    pub precision: u8,

    /// Decimal scaling hint.
    #[serde(default)]
    pub decimal: f64,

    /// Numeric option hint forwarded to the driver.
    #[serde(default)]
    pub option: u8,

    /// Free-text description.
    #[serde(default)]
    pub description: String,

    /// Prepared value for `STATIC` tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_value: Option<Value>,
}

impl Tag {
    /// Creates a tag with the given name, address, attributes and type.
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        attribute: Attribute,
        tag_type: TagType,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            attribute,
            tag_type,
            precision: 0,
            decimal: 0.0,
            option: 0,
            description: String::new(),
            static_value: None,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the static value; meaningful only for `STATIC` tags.
    pub fn with_static_value(mut self, value: Value) -> Self {
        self.static_value = Some(value);
        self
    }

    /// Returns `true` if the attribute set contains `attr`.
    #[inline]
    pub fn attribute_test(&self, attr: Attribute) -> bool {
        self.attribute.contains(attr)
    }

    /// Returns `true` if the tag is polled/reported/static-merged.
    #[inline]
    pub fn is_readable(&self) -> bool {
        self.attribute.is_readable()
    }

    /// Returns `true` if the tag value comes from the tag model.
    #[inline]
    pub fn is_static(&self) -> bool {
        self.attribute.contains(Attribute::STATIC)
    }

    /// Parses this tag's address option per its declared type.
    pub fn parse_address_option(&self) -> AddressResult<AddressOption> {
        parse_address_option(&self.address, self.tag_type)
    }

    // =========================================================================
    // Static Value
    // =========================================================================

    /// Returns a copy of the static value.
    ///
    /// Fails with `TagNotExist` when the tag is not `STATIC` or no value has
    /// been prepared yet.
    pub fn get_static_value(&self) -> Result<Value, ErrorCode> {
        if !self.is_static() {
            return Err(ErrorCode::TagNotExist);
        }
        self.static_value.clone().ok_or(ErrorCode::TagNotExist)
    }

    /// Replaces the static value after checking it against the declared type.
    pub fn set_static_value(&mut self, value: Value) -> Result<(), ErrorCode> {
        if !self.is_static() {
            return Err(ErrorCode::TagNotExist);
        }
        let coerced = coerce_value(self.tag_type, value)?;
        self.static_value = Some(coerced);
        Ok(())
    }

    /// Dumps the static value as a JSON string.
    pub fn dump_static_value(&self) -> Option<String> {
        if !self.is_static() {
            return None;
        }
        self.static_value
            .as_ref()
            .map(|v| v.to_json().to_string())
    }

    /// Loads the static value from a JSON string.
    pub fn load_static_value(&mut self, s: &str) -> Result<(), ErrorCode> {
        if !self.is_static() {
            return Err(ErrorCode::TagNotExist);
        }
        let json: serde_json::Value =
            serde_json::from_str(s).map_err(|_| ErrorCode::Internal)?;
        let value = value_from_json(self.tag_type, &json)?;
        self.static_value = Some(value);
        Ok(())
    }
}

// =============================================================================
// Value Conversion
// =============================================================================

/// Converts an incoming JSON value into the tag's declared native type.
///
/// This is the write-path conversion: integers fan out to every numeric
/// type, JSON floats land in `FLOAT`/`DOUBLE`, booleans in `BOOL`, strings
/// in `STRING`, and byte arrays in `BYTES`.
pub fn value_from_json(tag_type: TagType, json: &serde_json::Value) -> Result<Value, ErrorCode> {
    match json {
        serde_json::Value::Bool(b) => match tag_type {
            TagType::Bool => Ok(Value::Bool(*b)),
            TagType::Bit => Ok(Value::Bit(*b as u8)),
            _ => Err(ErrorCode::Internal),
        },
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                integer_to_value(tag_type, i)
            } else if let Some(f) = n.as_f64() {
                match tag_type {
                    TagType::Float => Ok(Value::Float(f as f32)),
                    TagType::Double => Ok(Value::Double(f)),
                    _ => Err(ErrorCode::Internal),
                }
            } else {
                Err(ErrorCode::Internal)
            }
        }
        serde_json::Value::String(s) => match tag_type {
            TagType::String => Ok(Value::Str(s.clone())),
            _ => Err(ErrorCode::Internal),
        },
        serde_json::Value::Array(items) => match tag_type {
            TagType::Bytes => {
                let mut bytes = Vec::with_capacity(items.len());
                for item in items {
                    let b = item
                        .as_u64()
                        .and_then(|v| u8::try_from(v).ok())
                        .ok_or(ErrorCode::Internal)?;
                    bytes.push(b);
                }
                Ok(Value::Bytes(bytes))
            }
            _ => Err(ErrorCode::Internal),
        },
        _ => Err(ErrorCode::Internal),
    }
}

/// Places a JSON integer into the storage class of `tag_type`.
fn integer_to_value(tag_type: TagType, i: i64) -> Result<Value, ErrorCode> {
    let out = match tag_type {
        TagType::Bit => Value::Bit(i as u8),
        TagType::Bool => Value::Bool(i != 0),
        TagType::Int8 => Value::Int8(i as i8),
        TagType::Uint8 => Value::Uint8(i as u8),
        TagType::Int16 => Value::Int16(i as i16),
        TagType::Uint16 | TagType::Word => Value::Uint16(i as u16),
        TagType::Int32 => Value::Int32(i as i32),
        TagType::Uint32 | TagType::Dword => Value::Uint32(i as u32),
        TagType::Int64 => Value::Int64(i),
        TagType::Uint64 | TagType::Lword => Value::Uint64(i as u64),
        TagType::Float => Value::Float(i as f32),
        TagType::Double => Value::Double(i as f64),
        TagType::String | TagType::Bytes => return Err(ErrorCode::Internal),
    };
    Ok(out)
}

/// Checks that `value` matches the storage class of `tag_type`, converting
/// between numeric classes where the original accepted it.
fn coerce_value(tag_type: TagType, value: Value) -> Result<Value, ErrorCode> {
    // Fast path: storage class already matches.
    if tag_type.default_value().type_name() == value.type_name() {
        return Ok(value);
    }
    // Numeric re-coercion through the JSON conversion table.
    value_from_json(tag_type, &value.to_json())
}

// =============================================================================
// TagValue
// =============================================================================

/// A tag name paired with a sampled or written value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagValue {
    /// Tag name.
    pub tag: String,
    /// The value.
    pub value: Value,
}

impl TagValue {
    /// Creates a tag/value pair.
    pub fn new(tag: impl Into<String>, value: Value) -> Self {
        Self {
            tag: tag.into(),
            value,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn static_float(value: f32) -> Tag {
        Tag::new("t", "1!400001", Attribute::STATIC, TagType::Float).with_static_value(Value::Float(value))
    }

    #[test]
    fn test_static_value_roundtrip_scalars() {
        let cases = [
            (TagType::Bit, Value::Bit(1)),
            (TagType::Bool, Value::Bool(true)),
            (TagType::Int8, Value::Int8(-5)),
            (TagType::Uint8, Value::Uint8(200)),
            (TagType::Int16, Value::Int16(-12345)),
            (TagType::Uint16, Value::Uint16(54321)),
            (TagType::Word, Value::Uint16(77)),
            (TagType::Int32, Value::Int32(-7)),
            (TagType::Uint32, Value::Uint32(7)),
            (TagType::Dword, Value::Uint32(8)),
            (TagType::Int64, Value::Int64(-1)),
            (TagType::Uint64, Value::Uint64(1)),
            (TagType::Lword, Value::Uint64(2)),
            (TagType::Double, Value::Double(2.5)),
            (TagType::String, Value::Str("hello".into())),
        ];
        for (tag_type, value) in cases {
            let mut tag = Tag::new("t", "1!1", Attribute::STATIC, tag_type);
            tag.set_static_value(value.clone()).unwrap();
            let dumped = tag.dump_static_value().unwrap();

            let mut other = Tag::new("t", "1!1", Attribute::STATIC, tag_type);
            other.load_static_value(&dumped).unwrap();
            assert_eq!(other.get_static_value().unwrap(), value, "{}", tag_type);
        }
    }

    #[test]
    fn test_static_value_requires_static_attribute() {
        let mut tag = Tag::new("t", "1!1", Attribute::READ, TagType::Int16);
        assert_eq!(
            tag.set_static_value(Value::Int16(1)),
            Err(ErrorCode::TagNotExist)
        );
        assert_eq!(tag.get_static_value(), Err(ErrorCode::TagNotExist));
        assert!(tag.dump_static_value().is_none());
    }

    #[test]
    fn test_static_value_unset() {
        let tag = Tag::new("t", "1!1", Attribute::STATIC, TagType::Float);
        assert_eq!(tag.get_static_value(), Err(ErrorCode::TagNotExist));
    }

    #[test]
    fn test_static_value_coercion() {
        let mut tag = static_float(0.0);
        // An integer JSON literal is acceptable for a float tag.
        tag.load_static_value("3").unwrap();
        assert_eq!(tag.get_static_value().unwrap(), Value::Float(3.0));
    }

    #[test]
    fn test_value_from_json_write_path() {
        assert_eq!(
            value_from_json(TagType::Int16, &serde_json::json!(42)).unwrap(),
            Value::Int16(42)
        );
        assert_eq!(
            value_from_json(TagType::Word, &serde_json::json!(42)).unwrap(),
            Value::Uint16(42)
        );
        assert_eq!(
            value_from_json(TagType::Double, &serde_json::json!(1.25)).unwrap(),
            Value::Double(1.25)
        );
        assert_eq!(
            value_from_json(TagType::Bool, &serde_json::json!(true)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            value_from_json(TagType::Bytes, &serde_json::json!([1, 2, 3])).unwrap(),
            Value::Bytes(vec![1, 2, 3])
        );
        assert!(value_from_json(TagType::Int16, &serde_json::json!("nope")).is_err());
        assert!(value_from_json(TagType::String, &serde_json::json!(1)).is_err());
    }

    #[test]
    fn test_parse_address_option_via_tag() {
        let tag = Tag::new("s", "4!400010.20H", Attribute::READ, TagType::String);
        let opt = tag.parse_address_option().unwrap();
        assert_eq!(
            opt,
            AddressOption::String {
                length: 20,
                mode: crate::address::StringMode::High
            }
        );
    }

    #[test]
    fn test_tag_serde() {
        let tag = static_float(3.14).with_description("pi");
        let json = serde_json::to_string(&tag).unwrap();
        let back: Tag = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tag);
        assert!(json.contains("\"FLOAT\""));
    }
}
