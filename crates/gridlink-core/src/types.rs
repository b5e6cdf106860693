// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! Core data types for GRIDLINK.
//!
//! This module provides the protocol-agnostic building blocks shared by the
//! whole gateway: node identity and states, the tag type lattice, the value
//! representation, and tag attributes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::ops::{BitOr, BitOrAssign};

// =============================================================================
// Identifiers
// =============================================================================

/// The name of a node (a driver or an app).
///
/// Node names are globally unique within a gateway instance and double as
/// the node's mailbox address on the message bus.
///
/// # Examples
///
/// ```
/// use gridlink_core::types::NodeName;
///
/// let name = NodeName::new("plc-east");
/// assert_eq!(name.as_str(), "plc-east");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeName(String);

impl NodeName {
    /// Creates a new node name.
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the name and returns the inner string.
    #[inline]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for NodeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Node Kind & States
// =============================================================================

/// The administrative kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Southbound protocol driver; owns groups and tags, polls devices.
    Driver,
    /// Northbound application; consumes snapshots and issues commands.
    App,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Driver => write!(f, "driver"),
            NodeKind::App => write!(f, "app"),
        }
    }
}

/// Running state of a node's adapter.
///
/// Transitions: `Init → Ready ↔ Running → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Created but not yet initialized.
    #[default]
    Init,
    /// Initialized and configured, timers not armed.
    Ready,
    /// Actively polling / publishing.
    Running,
    /// Uninitialized; the adapter is shutting down.
    Stopped,
}

impl NodeState {
    /// Returns `true` if the adapter may service data-plane work.
    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self, NodeState::Running)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Init => "init",
            NodeState::Ready => "ready",
            NodeState::Running => "running",
            NodeState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Connection state of the link behind a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Not connected to the device / sink.
    #[default]
    Disconnected,
    /// Connection in progress.
    Connecting,
    /// Connected and operational.
    Connected,
}

impl LinkState {
    /// Returns `true` if the link is up.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Node Status Cell
// =============================================================================

/// Lock-free cell holding a node's running and link states.
///
/// The adapter's control task is the only writer; the manager and the
/// metrics visitor read it.
#[derive(Debug)]
pub struct NodeStatusCell {
    state: std::sync::atomic::AtomicU8,
    link: std::sync::atomic::AtomicU8,
}

impl NodeStatusCell {
    /// Creates a cell in `Init` / `Disconnected`.
    pub fn new() -> Self {
        Self {
            state: std::sync::atomic::AtomicU8::new(0),
            link: std::sync::atomic::AtomicU8::new(0),
        }
    }

    /// Stores the running state.
    pub fn set_state(&self, state: NodeState) {
        let raw = match state {
            NodeState::Init => 0,
            NodeState::Ready => 1,
            NodeState::Running => 2,
            NodeState::Stopped => 3,
        };
        self.state.store(raw, std::sync::atomic::Ordering::Release);
    }

    /// Loads the running state.
    pub fn state(&self) -> NodeState {
        match self.state.load(std::sync::atomic::Ordering::Acquire) {
            0 => NodeState::Init,
            1 => NodeState::Ready,
            2 => NodeState::Running,
            _ => NodeState::Stopped,
        }
    }

    /// Stores the link state.
    pub fn set_link(&self, link: LinkState) {
        let raw = match link {
            LinkState::Disconnected => 0,
            LinkState::Connecting => 1,
            LinkState::Connected => 2,
        };
        self.link.store(raw, std::sync::atomic::Ordering::Release);
    }

    /// Loads the link state.
    pub fn link(&self) -> LinkState {
        match self.link.load(std::sync::atomic::Ordering::Acquire) {
            0 => LinkState::Disconnected,
            1 => LinkState::Connecting,
            _ => LinkState::Connected,
        }
    }
}

impl Default for NodeStatusCell {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tag Types
// =============================================================================

/// The declared type of a tag.
///
/// `Word`, `Dword` and `Lword` are PLC-style aliases that share storage with
/// the unsigned integers of the same width; they remain distinct declared
/// types because address-option parsing and display formatting key on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TagType {
    /// A single bit extracted from a wider cell.
    Bit,
    /// Boolean.
    Bool,
    /// Signed 8-bit integer.
    Int8,
    /// Unsigned 8-bit integer.
    Uint8,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    Uint16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    Uint32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 64-bit integer.
    Uint64,
    /// 32-bit IEEE float.
    Float,
    /// 64-bit IEEE float.
    Double,
    /// Character string.
    String,
    /// Raw byte string.
    Bytes,
    /// 16-bit word (unsigned storage).
    Word,
    /// 32-bit double word (unsigned storage).
    Dword,
    /// 64-bit long word (unsigned storage).
    Lword,
}

impl TagType {
    /// Returns the lowercase type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TagType::Bit => "bit",
            TagType::Bool => "bool",
            TagType::Int8 => "int8",
            TagType::Uint8 => "uint8",
            TagType::Int16 => "int16",
            TagType::Uint16 => "uint16",
            TagType::Int32 => "int32",
            TagType::Uint32 => "uint32",
            TagType::Int64 => "int64",
            TagType::Uint64 => "uint64",
            TagType::Float => "float",
            TagType::Double => "double",
            TagType::String => "string",
            TagType::Bytes => "bytes",
            TagType::Word => "word",
            TagType::Dword => "dword",
            TagType::Lword => "lword",
        }
    }

    /// Returns `true` for the 16-bit integer storage class.
    #[inline]
    pub fn is_16bit(&self) -> bool {
        matches!(self, TagType::Int16 | TagType::Uint16 | TagType::Word)
    }

    /// Returns `true` for the 32-bit integer / float storage class.
    #[inline]
    pub fn is_32bit(&self) -> bool {
        matches!(
            self,
            TagType::Int32 | TagType::Uint32 | TagType::Dword | TagType::Float
        )
    }

    /// Returns `true` for the 64-bit integer / double storage class.
    #[inline]
    pub fn is_64bit(&self) -> bool {
        matches!(
            self,
            TagType::Int64 | TagType::Uint64 | TagType::Lword | TagType::Double
        )
    }

    /// Returns the zero value of this type.
    pub fn default_value(&self) -> Value {
        match self {
            TagType::Bit => Value::Bit(0),
            TagType::Bool => Value::Bool(false),
            TagType::Int8 => Value::Int8(0),
            TagType::Uint8 => Value::Uint8(0),
            TagType::Int16 => Value::Int16(0),
            TagType::Uint16 | TagType::Word => Value::Uint16(0),
            TagType::Int32 => Value::Int32(0),
            TagType::Uint32 | TagType::Dword => Value::Uint32(0),
            TagType::Int64 => Value::Int64(0),
            TagType::Uint64 | TagType::Lword => Value::Uint64(0),
            TagType::Float => Value::Float(0.0),
            TagType::Double => Value::Double(0.0),
            TagType::String => Value::Str(String::new()),
            TagType::Bytes => Value::Bytes(Vec::new()),
        }
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Value
// =============================================================================

/// A typed tag value.
///
/// `Word`/`Dword`/`Lword` tags carry their values in the unsigned variants
/// of matching width, so the enum has one variant per storage class rather
/// than one per declared [`TagType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// A single bit (0 or 1).
    Bit(u8),
    /// Boolean.
    Bool(bool),
    /// Signed 8-bit integer.
    Int8(i8),
    /// Unsigned 8-bit integer.
    Uint8(u8),
    /// Signed 16-bit integer.
    Int16(i16),
    /// Unsigned 16-bit integer (also WORD).
    Uint16(u16),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 32-bit integer (also DWORD).
    Uint32(u32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 64-bit integer (also LWORD).
    Uint64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Character string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns the storage-class name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bit(_) => "bit",
            Value::Bool(_) => "bool",
            Value::Int8(_) => "int8",
            Value::Uint8(_) => "uint8",
            Value::Int16(_) => "int16",
            Value::Uint16(_) => "uint16",
            Value::Int32(_) => "int32",
            Value::Uint32(_) => "uint32",
            Value::Int64(_) => "int64",
            Value::Uint64(_) => "uint64",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
        }
    }

    /// Attempts to read this value as an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bit(v) => Some(*v as i64),
            Value::Bool(v) => Some(*v as i64),
            Value::Int8(v) => Some(*v as i64),
            Value::Uint8(v) => Some(*v as i64),
            Value::Int16(v) => Some(*v as i64),
            Value::Uint16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Uint32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            Value::Uint64(v) => i64::try_from(*v).ok(),
            Value::Float(v) => Some(*v as i64),
            Value::Double(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Attempts to read this value as an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Attempts to read this value as a string slice.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Converts this value to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bit(v) => serde_json::json!(*v),
            Value::Bool(v) => serde_json::Value::Bool(*v),
            Value::Int8(v) => serde_json::json!(*v),
            Value::Uint8(v) => serde_json::json!(*v),
            Value::Int16(v) => serde_json::json!(*v),
            Value::Uint16(v) => serde_json::json!(*v),
            Value::Int32(v) => serde_json::json!(*v),
            Value::Uint32(v) => serde_json::json!(*v),
            Value::Int64(v) => serde_json::json!(*v),
            Value::Uint64(v) => serde_json::json!(*v),
            Value::Float(v) => serde_json::json!(*v),
            Value::Double(v) => serde_json::json!(*v),
            Value::Str(v) => serde_json::Value::String(v.clone()),
            Value::Bytes(v) => serde_json::json!(v),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bit(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int8(v) => write!(f, "{}", v),
            Value::Uint8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Uint16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Uint32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Uint64(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

// =============================================================================
// Attribute
// =============================================================================

/// Tag attribute bit set drawn from `{READ, WRITE, SUBSCRIBE, STATIC}`.
///
/// Serialized as the raw integer, matching the external API convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Attribute(u8);

impl Attribute {
    /// No attributes.
    pub const NONE: Attribute = Attribute(0);
    /// Tag is polled from the device.
    pub const READ: Attribute = Attribute(1);
    /// Tag accepts writes.
    pub const WRITE: Attribute = Attribute(2);
    /// Tag is reported on change by the device.
    pub const SUBSCRIBE: Attribute = Attribute(4);
    /// Tag value comes from the tag model, not the device.
    pub const STATIC: Attribute = Attribute(8);

    /// Builds an attribute set from the raw bits (unknown bits are masked).
    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        Attribute(bits & 0x0f)
    }

    /// Returns the raw bits.
    #[inline]
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set in `self`.
    #[inline]
    pub fn contains(&self, other: Attribute) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if the tag is readable in the polling sense:
    /// `READ ∨ SUBSCRIBE ∨ STATIC`.
    #[inline]
    pub fn is_readable(&self) -> bool {
        self.contains(Attribute::READ)
            || self.contains(Attribute::SUBSCRIBE)
            || self.contains(Attribute::STATIC)
    }
}

impl BitOr for Attribute {
    type Output = Attribute;

    fn bitor(self, rhs: Attribute) -> Attribute {
        Attribute(self.0 | rhs.0)
    }
}

impl BitOrAssign for Attribute {
    fn bitor_assign(&mut self, rhs: Attribute) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(Attribute::READ) {
            parts.push("READ");
        }
        if self.contains(Attribute::WRITE) {
            parts.push("WRITE");
        }
        if self.contains(Attribute::SUBSCRIBE) {
            parts.push("SUBSCRIBE");
        }
        if self.contains(Attribute::STATIC) {
            parts.push("STATIC");
        }
        write!(f, "{}", parts.join("|"))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_name() {
        let name = NodeName::new("d1");
        assert_eq!(name.as_str(), "d1");
        assert_eq!(format!("{}", name), "d1");
        assert_eq!(NodeName::from("d1"), name);
    }

    #[test]
    fn test_node_state_transitions_display() {
        assert_eq!(format!("{}", NodeState::Init), "init");
        assert!(!NodeState::Ready.is_running());
        assert!(NodeState::Running.is_running());
    }

    #[test]
    fn test_tag_type_storage_classes() {
        assert!(TagType::Word.is_16bit());
        assert!(TagType::Int16.is_16bit());
        assert!(TagType::Float.is_32bit());
        assert!(TagType::Dword.is_32bit());
        assert!(TagType::Double.is_64bit());
        assert!(TagType::Lword.is_64bit());
        assert!(!TagType::String.is_16bit());
    }

    #[test]
    fn test_tag_type_default_value() {
        assert_eq!(TagType::Word.default_value(), Value::Uint16(0));
        assert_eq!(TagType::Lword.default_value(), Value::Uint64(0));
        assert_eq!(TagType::Bool.default_value(), Value::Bool(false));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::Int16(42).as_i64(), Some(42));
        assert_eq!(Value::Uint64(7).as_f64(), Some(7.0));
        assert_eq!(Value::Double(3.5).as_f64(), Some(3.5));
        assert_eq!(Value::Str("x".into()).as_str(), Some("x"));
        assert_eq!(Value::Str("x".into()).as_i64(), None);
    }

    #[test]
    fn test_value_json() {
        assert_eq!(Value::Float(1.5).to_json(), serde_json::json!(1.5));
        assert_eq!(Value::Bool(true).to_json(), serde_json::json!(true));
    }

    #[test]
    fn test_attribute_bits() {
        let a = Attribute::READ | Attribute::STATIC;
        assert!(a.contains(Attribute::READ));
        assert!(a.contains(Attribute::STATIC));
        assert!(!a.contains(Attribute::WRITE));
        assert!(a.is_readable());
        assert_eq!(Attribute::from_bits(a.bits()), a);
        assert_eq!(format!("{}", a), "READ|STATIC");
    }

    #[test]
    fn test_attribute_subscribe_is_readable() {
        assert!(Attribute::SUBSCRIBE.is_readable());
        assert!(!Attribute::WRITE.is_readable());
    }

    #[test]
    fn test_tag_type_serde_uppercase() {
        let json = serde_json::to_string(&TagType::Uint16).unwrap();
        assert_eq!(json, "\"UINT16\"");
        let back: TagType = serde_json::from_str("\"LWORD\"").unwrap();
        assert_eq!(back, TagType::Lword);
    }
}
