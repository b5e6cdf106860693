// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! The closed error-code set of the gateway.
//!
//! Every control-plane operation resolves to one of these codes; the data
//! plane reports failures through metrics instead. Codes travel across the
//! message bus inside `RespError` envelopes and out of the REST adapter as
//! numeric values, so the set is closed and each variant has a stable code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// ErrorCode
// =============================================================================

/// Gateway error codes.
///
/// `Success` is a member because per-tag result arrays (batch writes, bulk
/// tag adds) report one code per element, most of them `Success`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Operation succeeded.
    #[error("success")]
    Success,

    /// Unclassified internal failure.
    #[error("internal error")]
    Internal,

    /// A node with this name already exists.
    #[error("node already exists")]
    NodeExist,

    /// No node with this name.
    #[error("node not found")]
    NodeNotExist,

    /// Node is singleton-protected and cannot be deleted.
    #[error("node is not allowed to be deleted")]
    NodeNotAllowDelete,

    /// Target node cannot subscribe (not an app).
    #[error("node is not allowed to subscribe")]
    NodeNotAllowSubscribe,

    /// A tag with this name already exists in the group.
    #[error("tag name conflict")]
    TagNameConflict,

    /// No tag with this name in the group.
    #[error("tag not found")]
    TagNotExist,

    /// No group with this name on the driver.
    #[error("group not found")]
    GroupNotExist,

    /// Driver already holds the maximum number of groups.
    #[error("too many groups on node")]
    GroupMaxGroups,

    /// The subscription does not exist.
    #[error("group not subscribed")]
    GroupNotSubscribe,

    /// Group parameter out of range (name or interval).
    #[error("invalid group parameter")]
    GroupParameterInvalid,

    /// No plugin module with this name.
    #[error("plugin library not found")]
    LibraryNotFound,

    /// Singleton plugin cannot instantiate another node.
    #[error("plugin library does not allow creating instances")]
    LibraryNotAllowCreateInstance,

    /// Plugin module failed to open an instance.
    #[error("plugin library failed to open")]
    LibraryFailedToOpen,

    /// Plugin kind does not match the requested node kind.
    #[error("plugin type not supported for this node")]
    PluginTypeNotSupport,

    /// Generic MQTT-side failure.
    #[error("mqtt failure")]
    MqttFailure,

    /// MQTT client handle is not available.
    #[error("mqtt client is null")]
    MqttIsNull,

    /// MQTT publish failed.
    #[error("mqtt publish failure")]
    MqttPublishFailure,

    /// MQTT subscribe failed.
    #[error("mqtt subscribe failure")]
    MqttSubscribeFailure,
}

impl ErrorCode {
    /// Returns the stable numeric code.
    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::Success => 0,
            ErrorCode::Internal => 1001,
            ErrorCode::NodeExist => 2002,
            ErrorCode::NodeNotExist => 2003,
            ErrorCode::NodeNotAllowDelete => 2004,
            ErrorCode::NodeNotAllowSubscribe => 2005,
            ErrorCode::GroupNotExist => 2101,
            ErrorCode::GroupMaxGroups => 2102,
            ErrorCode::GroupNotSubscribe => 2103,
            ErrorCode::GroupParameterInvalid => 2104,
            ErrorCode::TagNameConflict => 2201,
            ErrorCode::TagNotExist => 2202,
            ErrorCode::LibraryNotFound => 2301,
            ErrorCode::LibraryNotAllowCreateInstance => 2302,
            ErrorCode::LibraryFailedToOpen => 2303,
            ErrorCode::PluginTypeNotSupport => 2304,
            ErrorCode::MqttFailure => 4001,
            ErrorCode::MqttIsNull => 4002,
            ErrorCode::MqttPublishFailure => 4003,
            ErrorCode::MqttSubscribeFailure => 4004,
        }
    }

    /// Returns `true` for `Success`.
    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Folds a `Result` over the code set back into a plain code.
    pub fn from_result(result: Result<(), ErrorCode>) -> ErrorCode {
        match result {
            Ok(()) => ErrorCode::Success,
            Err(code) => code,
        }
    }

    /// Returns the error type as a short string for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            ErrorCode::Success => "success",
            ErrorCode::Internal => "internal",
            ErrorCode::NodeExist
            | ErrorCode::NodeNotExist
            | ErrorCode::NodeNotAllowDelete
            | ErrorCode::NodeNotAllowSubscribe => "node",
            ErrorCode::GroupNotExist
            | ErrorCode::GroupMaxGroups
            | ErrorCode::GroupNotSubscribe
            | ErrorCode::GroupParameterInvalid => "group",
            ErrorCode::TagNameConflict | ErrorCode::TagNotExist => "tag",
            ErrorCode::LibraryNotFound
            | ErrorCode::LibraryNotAllowCreateInstance
            | ErrorCode::LibraryFailedToOpen
            | ErrorCode::PluginTypeNotSupport => "library",
            ErrorCode::MqttFailure
            | ErrorCode::MqttIsNull
            | ErrorCode::MqttPublishFailure
            | ErrorCode::MqttSubscribeFailure => "mqtt",
        }
    }
}

// =============================================================================
// Bus Errors
// =============================================================================

/// Message bus delivery errors.
///
/// Delivery failures are transient from the caller's perspective; the
/// envelope is handed back so the sender retains ownership.
#[derive(Debug, Error)]
pub enum BusError<T> {
    /// No mailbox is registered under the destination name.
    #[error("no mailbox registered for destination")]
    NoSuchMailbox(T),

    /// The destination mailbox is full.
    #[error("destination mailbox full")]
    MailboxFull(T),

    /// The destination mailbox was closed.
    #[error("destination mailbox closed")]
    MailboxClosed(T),
}

impl<T> BusError<T> {
    /// Recovers the undelivered payload.
    pub fn into_inner(self) -> T {
        match self {
            BusError::NoSuchMailbox(v) => v,
            BusError::MailboxFull(v) => v,
            BusError::MailboxClosed(v) => v,
        }
    }
}

// =============================================================================
// Result Aliases
// =============================================================================

/// Control-plane result carrying a value or an error code.
pub type GwResult<T> = Result<T, ErrorCode>;

// =============================================================================
// Tests
// =============================================================================
