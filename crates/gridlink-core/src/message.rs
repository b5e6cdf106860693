// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! Message envelopes exchanged between adapters.
//!
//! The body is a tagged union: one variant per request/response kind, each
//! carrying a typed payload. An envelope is reused for its reply via
//! [`Envelope::into_reply`], which swaps sender and receiver and keeps the
//! correlation context. The documented request/response pairs are
//! `UpdateGroup → UpdateGroupResp`, `GetNodeSetting → GetNodeSettingResp`,
//! `ReadGroup → ReadGroupResp`, `NodeUninit → RespError`, and `RespError`
//! answers everything else.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::tag::{Tag, TagValue};
use crate::types::{LinkState, NodeName, NodeState};

// =============================================================================
// Context
// =============================================================================

/// Correlation context minted by the originator of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Uuid);

impl Context {
    /// Mints a fresh context.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The nil context for fire-and-forget messages.
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Bodies
// =============================================================================

/// Synchronous error reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespError {
    /// Result code.
    pub error: ErrorCode,
}

/// On-demand read of a whole group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadGroupReq {
    /// Target driver.
    pub driver: NodeName,
    /// Group to read.
    pub group: String,
}

/// Values produced by an on-demand group read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadGroupResp {
    /// Source driver.
    pub driver: NodeName,
    /// Source group.
    pub group: String,
    /// Result code of the read as a whole.
    pub error: ErrorCode,
    /// Sampled values.
    pub values: Vec<TagValue>,
}

/// Write of a single tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteTagReq {
    /// Target driver.
    pub driver: NodeName,
    /// Group holding the tag.
    pub group: String,
    /// Tag name.
    pub tag: String,
    /// Raw JSON value, converted to the tag's native type by the driver.
    pub value: serde_json::Value,
}

/// One element of a batch write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteTagItem {
    /// Tag name.
    pub tag: String,
    /// Raw JSON value.
    pub value: serde_json::Value,
}

/// Write of several tags in one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteTagsReq {
    /// Target driver.
    pub driver: NodeName,
    /// Group holding the tags.
    pub group: String,
    /// Tags and values.
    pub tags: Vec<WriteTagItem>,
}

/// Subscription announcement delivered to both ends of a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeReq {
    /// Subscribing app.
    pub app: NodeName,
    /// Publishing driver.
    pub driver: NodeName,
    /// Group name.
    pub group: String,
    /// Opaque params blob (e.g. a topic template).
    pub params: Option<String>,
}

/// Subscription teardown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsubscribeReq {
    /// Subscribing app.
    pub app: NodeName,
    /// Publishing driver.
    pub driver: NodeName,
    /// Group name.
    pub group: String,
}

/// Group creation on a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddGroupReq {
    /// Group name.
    pub group: String,
    /// Poll interval in milliseconds.
    pub interval_ms: u32,
}

/// Group deletion on a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelGroupReq {
    /// Group name.
    pub group: String,
}

/// Group update (interval and/or rename).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateGroupReq {
    /// Current group name.
    pub group: String,
    /// New name, if renaming.
    pub new_name: Option<String>,
    /// New interval, if changing.
    pub interval_ms: Option<u32>,
}

/// Reply to a group update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateGroupResp {
    /// Result code.
    pub error: ErrorCode,
    /// The group's name after the operation.
    pub group: String,
}

/// Tag addition or update on one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagReq {
    /// Group holding the tags.
    pub group: String,
    /// The tags.
    pub tags: Vec<Tag>,
}

/// Tag deletion on one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelTagReq {
    /// Group holding the tags.
    pub group: String,
    /// Names to delete.
    pub tags: Vec<String>,
}

/// One group with its tags, for bulk driver creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTags {
    /// Group name.
    pub group: String,
    /// Poll interval in milliseconds.
    pub interval_ms: u32,
    /// Tags to create.
    pub tags: Vec<Tag>,
}

/// Bulk group+tag creation on a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GTagReq {
    /// Groups with their tags.
    pub groups: Vec<GroupTags>,
}

/// Setting blob applied to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSettingReq {
    /// Opaque JSON setting.
    pub setting: String,
}

/// Reply carrying a node's current setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSettingResp {
    /// Result code.
    pub error: ErrorCode,
    /// Opaque JSON setting, when present.
    pub setting: Option<String>,
}

/// Start/stop control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCtl {
    /// Arm timers / open sinks.
    Start,
    /// Disarm timers / close sinks.
    Stop,
}

/// Node rename notification to the adapter itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRenameReq {
    /// The new name.
    pub new_name: NodeName,
}

/// One group poll snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransData {
    /// Producing driver.
    pub driver: NodeName,
    /// Producing group.
    pub group: String,
    /// Snapshot timestamp in milliseconds.
    pub timestamp_ms: i64,
    /// Tag values, static tags merged in.
    pub values: Vec<TagValue>,
}

/// State of one node as seen by the manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStateEntry {
    /// Node name.
    pub node: NodeName,
    /// Running state.
    pub state: NodeState,
    /// Link state.
    pub link: LinkState,
}

/// Periodic state digest pushed to running apps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NodesState {
    /// All nodes.
    pub states: Vec<NodeStateEntry>,
}

/// Notification that a driver was deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDeleted {
    /// The deleted node.
    pub node: NodeName,
}

// =============================================================================
// Body
// =============================================================================

/// The closed set of envelope payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Body {
    /// Error reply.
    RespError(RespError),
    /// On-demand group read.
    ReadGroup(ReadGroupReq),
    /// Group read reply.
    ReadGroupResp(ReadGroupResp),
    /// Single-tag write.
    WriteTag(WriteTagReq),
    /// Batch tag write.
    WriteTags(WriteTagsReq),
    /// Subscription announcement.
    SubscribeGroup(SubscribeReq),
    /// Subscription params update.
    UpdateSubscribeGroup(SubscribeReq),
    /// Subscription teardown.
    UnsubscribeGroup(UnsubscribeReq),
    /// Group creation.
    AddGroup(AddGroupReq),
    /// Group deletion.
    DelGroup(DelGroupReq),
    /// Group update.
    UpdateGroup(UpdateGroupReq),
    /// Group update reply.
    UpdateGroupResp(UpdateGroupResp),
    /// Tag addition.
    AddTag(TagReq),
    /// Tag update.
    UpdateTag(TagReq),
    /// Tag deletion.
    DelTag(DelTagReq),
    /// Bulk group+tag creation.
    AddGTags(GTagReq),
    /// Setting query.
    GetNodeSetting,
    /// Setting query reply.
    GetNodeSettingResp(NodeSettingResp),
    /// Setting application.
    NodeSetting(NodeSettingReq),
    /// Start/stop control.
    NodeCtl(NodeCtl),
    /// Rename notification.
    NodeRename(NodeRenameReq),
    /// Orderly teardown request.
    NodeUninit,
    /// Poll snapshot.
    TransData(TransData),
    /// Node state digest.
    NodesState(NodesState),
    /// Driver deletion notification.
    NodeDeleted(NodeDeleted),
}

impl Body {
    /// Returns the kind name for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Body::RespError(_) => "resp_error",
            Body::ReadGroup(_) => "read_group",
            Body::ReadGroupResp(_) => "read_group_resp",
            Body::WriteTag(_) => "write_tag",
            Body::WriteTags(_) => "write_tags",
            Body::SubscribeGroup(_) => "subscribe_group",
            Body::UpdateSubscribeGroup(_) => "update_subscribe_group",
            Body::UnsubscribeGroup(_) => "unsubscribe_group",
            Body::AddGroup(_) => "add_group",
            Body::DelGroup(_) => "del_group",
            Body::UpdateGroup(_) => "update_group",
            Body::UpdateGroupResp(_) => "update_group_resp",
            Body::AddTag(_) => "add_tag",
            Body::UpdateTag(_) => "update_tag",
            Body::DelTag(_) => "del_tag",
            Body::AddGTags(_) => "add_gtags",
            Body::GetNodeSetting => "get_node_setting",
            Body::GetNodeSettingResp(_) => "get_node_setting_resp",
            Body::NodeSetting(_) => "node_setting",
            Body::NodeCtl(_) => "node_ctl",
            Body::NodeRename(_) => "node_rename",
            Body::NodeUninit => "node_uninit",
            Body::TransData(_) => "trans_data",
            Body::NodesState(_) => "nodes_state",
            Body::NodeDeleted(_) => "node_deleted",
        }
    }

    /// Returns `true` for response kinds.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Body::RespError(_)
                | Body::ReadGroupResp(_)
                | Body::UpdateGroupResp(_)
                | Body::GetNodeSettingResp(_)
        )
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// A message envelope routed over the bus by receiver name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Originating node (or `manager`).
    pub sender: NodeName,
    /// Destination node.
    pub receiver: NodeName,
    /// Correlation context carried into the reply.
    pub context: Context,
    /// Typed payload.
    pub body: Body,
}

impl Envelope {
    /// Creates an envelope with a fresh context.
    pub fn new(sender: impl Into<NodeName>, receiver: impl Into<NodeName>, body: Body) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            context: Context::new(),
            body,
        }
    }

    /// Creates an envelope carrying an existing context.
    pub fn with_context(
        sender: impl Into<NodeName>,
        receiver: impl Into<NodeName>,
        context: Context,
        body: Body,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            context,
            body,
        }
    }

    /// Consumes this envelope into its reply: sender and receiver swap, the
    /// context is preserved, the body is replaced.
    pub fn into_reply(self, body: Body) -> Envelope {
        Envelope {
            sender: self.receiver,
            receiver: self.sender,
            context: self.context,
            body,
        }
    }

    /// Shorthand for an error reply.
    pub fn into_error_reply(self, error: ErrorCode) -> Envelope {
        self.into_reply(Body::RespError(RespError { error }))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn test_into_reply_swaps_and_keeps_context() {
        let env = Envelope::new(
            "a1",
            "d1",
            Body::WriteTag(WriteTagReq {
                driver: "d1".into(),
                group: "g1".into(),
                tag: "t1".into(),
                value: serde_json::json!(42),
            }),
        );
        let ctx = env.context;
        let reply = env.into_error_reply(ErrorCode::Success);
        assert_eq!(reply.sender, NodeName::new("d1"));
        assert_eq!(reply.receiver, NodeName::new("a1"));
        assert_eq!(reply.context, ctx);
        assert!(matches!(
            reply.body,
            Body::RespError(RespError {
                error: ErrorCode::Success
            })
        ));
    }

    #[test]
    fn test_body_kind_names() {
        let body = Body::TransData(TransData {
            driver: "d1".into(),
            group: "g1".into(),
            timestamp_ms: 0,
            values: vec![TagValue::new("t1", Value::Int16(1))],
        });
        assert_eq!(body.kind(), "trans_data");
        assert!(!body.is_response());
        assert!(Body::RespError(RespError {
            error: ErrorCode::Success
        })
        .is_response());
    }

    #[test]
    fn test_envelope_serde() {
        let env = Envelope::new(
            "manager",
            "d1",
            Body::AddGroup(AddGroupReq {
                group: "g1".into(),
                interval_ms: 1000,
            }),
        );
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
        assert!(json.contains("\"add_group\""));
    }

    #[test]
    fn test_context_identity() {
        assert_ne!(Context::new(), Context::new());
        assert_eq!(Context::nil(), Context::nil());
    }
}
