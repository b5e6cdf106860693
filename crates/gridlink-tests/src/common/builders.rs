// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! Builders for test fixtures.

use gridlink_core::message::GroupTags;
use gridlink_core::tag::Tag;
use gridlink_core::types::{Attribute, TagType, Value};

/// A readable INT16 holding-register tag.
pub fn int16_tag(name: &str, address: &str) -> Tag {
    Tag::new(name, address, Attribute::READ, TagType::Int16)
}

/// A readable and writable INT16 holding-register tag.
pub fn writable_int16_tag(name: &str, address: &str) -> Tag {
    Tag::new(
        name,
        address,
        Attribute::READ | Attribute::WRITE,
        TagType::Int16,
    )
}

/// A STATIC float tag with a prepared value.
pub fn static_float_tag(name: &str, value: f32) -> Tag {
    Tag::new(name, "1!400100", Attribute::STATIC, TagType::Float)
        .with_static_value(Value::Float(value))
}

/// One group with tags for bulk driver creation.
pub fn group_tags(group: &str, interval_ms: u32, tags: Vec<Tag>) -> GroupTags {
    GroupTags {
        group: group.to_string(),
        interval_ms,
        tags,
    }
}
