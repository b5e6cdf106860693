// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! The driver adapter: owns groups, drives per-group polling, serves the
//! write and tag-mutation paths.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::AdapterContext;
use crate::error::ErrorCode;
use crate::group::{Group, GroupTable, MIN_INTERVAL_MS};
use crate::message::{
    AddGroupReq, Body, Context, DelGroupReq, DelTagReq, Envelope, GTagReq, NodeCtl,
    NodeSettingResp, ReadGroupReq, ReadGroupResp, RespError, SubscribeReq, TagReq, TransData,
    UnsubscribeReq, UpdateGroupReq, UpdateGroupResp, WriteTagReq, WriteTagsReq,
};
use crate::metrics::{MetricKind, METRIC_GROUP_TIMER_TICKS, METRIC_RECV_MSGS, METRIC_TAG_READS_ROLLING};
use crate::plugin::{DriverPlugin, PluginGroup};
use crate::reactor::{Reactor, ReactorEvent, TimerId, TimerTick};
use crate::subscription::AppSubscription;
use crate::tag::{value_from_json, Tag, TagValue};
use crate::types::{Attribute, NodeName, NodeState};

// =============================================================================
// Group Slot
// =============================================================================

/// Runtime polling state for one group.
struct GroupSlot {
    timer: Option<TimerId>,
    armed_interval_ms: u32,
    /// Group revision the current plan was built from.
    cached_rev: i64,
    plan: PluginGroup,
    static_tags: Vec<Tag>,
    subscribers: Vec<AppSubscription>,
}

impl GroupSlot {
    fn new(name: &str, interval_ms: u32) -> Self {
        Self {
            timer: None,
            armed_interval_ms: interval_ms,
            // Forces a plan build on the first tick.
            cached_rev: -1,
            plan: PluginGroup::new(name, Vec::new(), interval_ms),
            static_tags: Vec::new(),
            subscribers: Vec::new(),
        }
    }
}

// =============================================================================
// DriverAdapter
// =============================================================================

/// One running driver node.
pub struct DriverAdapter {
    ctx: AdapterContext,
    plugin: Box<dyn DriverPlugin>,
    groups: Arc<GroupTable>,
    slots: HashMap<String, GroupSlot>,
    timers: HashMap<TimerId, String>,
    reactor: Reactor,
    setting: Option<String>,
}

impl DriverAdapter {
    /// Assembles the adapter; [`run`](Self::run) drives it.
    pub fn new(ctx: AdapterContext, plugin: Box<dyn DriverPlugin>, groups: Arc<GroupTable>) -> Self {
        let reactor = Reactor::new(ctx.node().into_inner());
        let setting = ctx.setting.clone();
        Self {
            ctx,
            plugin,
            groups,
            slots: HashMap::new(),
            timers: HashMap::new(),
            reactor,
            setting,
        }
    }

    /// The adapter control loop. Returns when the node is uninitialized.
    pub async fn run(mut self) {
        self.ctx.register_base_metrics();
        self.ctx.metrics.register(
            METRIC_GROUP_TIMER_TICKS,
            "group poll cycles executed",
            MetricKind::Counter,
            0,
        );
        self.ctx.metrics.register(
            METRIC_TAG_READS_ROLLING,
            "tag values sampled over the rolling window",
            MetricKind::RollingCounter,
            0,
        );

        let env = self.ctx.plugin_env();
        if let Err(code) = self.plugin.init(env, self.ctx.load).await {
            tracing::error!(node = %self.ctx.node(), %code, "driver init failed");
            self.ctx.status.set_state(NodeState::Stopped);
            return;
        }
        if let Some(setting) = self.setting.clone() {
            if let Err(code) = self.plugin.setting(&setting).await {
                tracing::warn!(node = %self.ctx.node(), %code, "driver setting rejected");
            }
        }
        self.ctx.status.set_state(NodeState::Ready);

        let mailbox = self.ctx.mailbox.take().expect("mailbox present at spawn");
        let _source = self.reactor.add_mailbox(mailbox.into_receiver());

        loop {
            match self.reactor.poll().await {
                ReactorEvent::Tick(tick) => self.handle_tick(tick).await,
                ReactorEvent::Mail(envelope) => {
                    self.ctx.metrics.update(METRIC_RECV_MSGS, 1);
                    if !self.handle_mail(envelope).await {
                        break;
                    }
                }
                ReactorEvent::SourceClosed(_) => break,
            }
        }

        self.reactor.close();
        self.ctx.status.set_state(NodeState::Stopped);
    }

    // =========================================================================
    // Poll Cycle
    // =========================================================================

    async fn handle_tick(&mut self, tick: TimerTick) {
        let Some(name) = self.timers.get(&tick.id()).cloned() else {
            return;
        };
        self.ctx.metrics.update(METRIC_GROUP_TIMER_TICKS, 1);
        self.poll_group(&name).await;
        // The tick guard drops here; Block timers re-arm now.
        drop(tick);
    }

    async fn poll_group(&mut self, name: &str) {
        let Some(group) = self.groups.get(name) else {
            return;
        };
        let Some(slot) = self.slots.get_mut(name) else {
            return;
        };

        if group.is_changed(slot.cached_rev) {
            rebuild_plan(&group, slot);
            if let Err(code) = self.plugin.group_sync(&mut slot.plan).await {
                tracing::warn!(node = %self.ctx.node(), group = name, %code, "group sync failed");
            }
            if slot.armed_interval_ms != slot.plan.interval_ms {
                if let Some(old) = slot.timer.take() {
                    self.reactor.del_timer(old);
                    self.timers.remove(&old);
                }
                let id = self.reactor.add_timer(
                    Duration::from_millis(slot.plan.interval_ms as u64),
                    self.ctx.descriptor.timer_kind,
                );
                self.timers.insert(id, name.to_string());
                slot.timer = Some(id);
                slot.armed_interval_ms = slot.plan.interval_ms;
            }
        }

        let mut values = match self.plugin.group_timer(&mut slot.plan).await {
            Ok(values) => values,
            Err(code) => {
                tracing::warn!(node = %self.ctx.node(), group = name, %code, "group poll failed");
                return;
            }
        };

        // Static tag values come from the tag model, not the device.
        for tag in &slot.static_tags {
            if let Ok(value) = tag.get_static_value() {
                values.push(TagValue::new(tag.name.clone(), value));
            }
        }

        self.ctx
            .metrics
            .update(METRIC_TAG_READS_ROLLING, values.len() as i64);

        let data = TransData {
            driver: self.ctx.node(),
            group: name.to_string(),
            timestamp_ms: self.ctx.clock.now_ms(),
            values,
        };
        for sub in &slot.subscribers {
            let envelope = Envelope::with_context(
                self.ctx.node(),
                sub.app.clone(),
                Context::nil(),
                Body::TransData(data.clone()),
            );
            self.ctx.send(envelope);
        }
    }

    // =========================================================================
    // Mailbox
    // =========================================================================

    /// Handles one envelope; `false` ends the control loop.
    async fn handle_mail(&mut self, envelope: Envelope) -> bool {
        let Envelope {
            sender,
            context,
            body,
            ..
        } = envelope;

        match body {
            Body::NodeCtl(ctl) => {
                let code = self.node_ctl(ctl).await;
                self.reply(sender, context, code);
            }
            Body::NodeSetting(req) => {
                let code = match self.plugin.setting(&req.setting).await {
                    Ok(()) => {
                        self.setting = Some(req.setting);
                        ErrorCode::Success
                    }
                    Err(code) => code,
                };
                self.reply(sender, context, code);
            }
            Body::GetNodeSetting => {
                let body = Body::GetNodeSettingResp(NodeSettingResp {
                    error: ErrorCode::Success,
                    setting: self.setting.clone(),
                });
                self.ctx.send(Envelope::with_context(self.ctx.node(), sender, context, body));
            }
            Body::NodeRename(req) => {
                *self.ctx.name.write() = req.new_name;
                self.reply(sender, context, ErrorCode::Success);
            }
            Body::NodeUninit => {
                self.uninit().await;
                self.reply(sender, context, ErrorCode::Success);
                return false;
            }
            Body::AddGroup(req) => {
                let code = self.add_group(req);
                self.reply(sender, context, code);
            }
            Body::DelGroup(req) => {
                let code = self.del_group(req);
                self.reply(sender, context, code);
            }
            Body::UpdateGroup(req) => {
                let resp = self.update_group(req);
                self.ctx.send(Envelope::with_context(
                    self.ctx.node(),
                    sender,
                    context,
                    Body::UpdateGroupResp(resp),
                ));
            }
            Body::AddTag(req) => {
                let code = self.add_tags(req).await;
                self.reply(sender, context, code);
            }
            Body::UpdateTag(req) => {
                let code = self.update_tags(req).await;
                self.reply(sender, context, code);
            }
            Body::DelTag(req) => {
                let code = self.del_tags(req).await;
                self.reply(sender, context, code);
            }
            Body::AddGTags(req) => {
                let code = self.add_gtags(req).await;
                self.reply(sender, context, code);
            }
            Body::SubscribeGroup(req) | Body::UpdateSubscribeGroup(req) => {
                self.subscribe(req);
            }
            Body::UnsubscribeGroup(req) => {
                self.unsubscribe(req);
            }
            Body::WriteTag(req) => {
                let code = self.write_tag(req).await;
                self.reply(sender, context, code);
            }
            Body::WriteTags(req) => {
                let code = self.write_tags(req).await;
                self.reply(sender, context, code);
            }
            Body::ReadGroup(req) => {
                let resp = self.read_group(req).await;
                self.ctx.send(Envelope::with_context(
                    self.ctx.node(),
                    sender,
                    context,
                    Body::ReadGroupResp(resp),
                ));
            }
            other => {
                tracing::warn!(
                    node = %self.ctx.node(),
                    kind = other.kind(),
                    "dropping unhandled envelope"
                );
            }
        }
        true
    }

    fn reply(&self, receiver: NodeName, context: Context, error: ErrorCode) {
        let body = Body::RespError(RespError { error });
        self.ctx
            .send(Envelope::with_context(self.ctx.node(), receiver, context, body));
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    async fn node_ctl(&mut self, ctl: NodeCtl) -> ErrorCode {
        match ctl {
            NodeCtl::Start => {
                if self.ctx.status.state() == NodeState::Running {
                    return ErrorCode::Success;
                }
                if let Err(code) = self.plugin.start().await {
                    return code;
                }
                self.arm_all_timers();
                self.ctx.status.set_state(NodeState::Running);
                ErrorCode::Success
            }
            NodeCtl::Stop => {
                if self.ctx.status.state() == NodeState::Running {
                    if let Err(code) = self.plugin.stop().await {
                        return code;
                    }
                    self.disarm_all_timers();
                    self.ctx.status.set_state(NodeState::Ready);
                }
                ErrorCode::Success
            }
        }
    }

    async fn uninit(&mut self) {
        if self.ctx.status.state() == NodeState::Running {
            let _ = self.plugin.stop().await;
        }
        self.disarm_all_timers();
        if let Err(code) = self.plugin.uninit().await {
            tracing::warn!(node = %self.ctx.node(), %code, "driver uninit failed");
        }
    }

    fn arm_all_timers(&mut self) {
        let names: Vec<String> = self.slots.keys().cloned().collect();
        for name in names {
            self.arm_timer(&name);
        }
    }

    fn arm_timer(&mut self, name: &str) {
        let Some(group) = self.groups.get(name) else {
            return;
        };
        let Some(slot) = self.slots.get_mut(name) else {
            return;
        };
        if slot.timer.is_some() {
            return;
        }
        let interval = group.interval_ms();
        let id = self.reactor.add_timer(
            Duration::from_millis(interval as u64),
            self.ctx.descriptor.timer_kind,
        );
        self.timers.insert(id, name.to_string());
        slot.timer = Some(id);
        slot.armed_interval_ms = interval;
    }

    fn disarm_all_timers(&mut self) {
        for slot in self.slots.values_mut() {
            if let Some(id) = slot.timer.take() {
                self.reactor.del_timer(id);
                self.timers.remove(&id);
            }
        }
    }

    // =========================================================================
    // Group Operations
    // =========================================================================

    fn add_group(&mut self, req: AddGroupReq) -> ErrorCode {
        if req.group.is_empty() || req.interval_ms < MIN_INTERVAL_MS {
            return ErrorCode::GroupParameterInvalid;
        }
        if self.groups.contains(&req.group) {
            // Idempotent re-creation.
            return ErrorCode::Success;
        }
        let group = Arc::new(Group::new(req.group.clone(), req.interval_ms));
        self.groups.insert(group);
        self.slots
            .insert(req.group.clone(), GroupSlot::new(&req.group, req.interval_ms));
        if self.ctx.status.state() == NodeState::Running {
            self.arm_timer(&req.group);
        }
        ErrorCode::Success
    }

    fn del_group(&mut self, req: DelGroupReq) -> ErrorCode {
        let Some(mut slot) = self.slots.remove(&req.group) else {
            return ErrorCode::GroupNotExist;
        };
        if let Some(id) = slot.timer.take() {
            self.reactor.del_timer(id);
            self.timers.remove(&id);
        }
        self.groups.remove(&req.group);
        ErrorCode::Success
    }

    fn update_group(&mut self, req: UpdateGroupReq) -> UpdateGroupResp {
        if !self.slots.contains_key(&req.group) {
            return UpdateGroupResp {
                error: ErrorCode::GroupNotExist,
                group: req.group,
            };
        }
        let mut final_name = req.group.clone();

        if let Some(new_name) = req.new_name.filter(|n| n != &req.group) {
            if new_name.is_empty() || self.groups.contains(&new_name) {
                return UpdateGroupResp {
                    error: ErrorCode::GroupParameterInvalid,
                    group: req.group,
                };
            }
            self.groups.rename(&req.group, &new_name);
            let mut slot = self.slots.remove(&req.group).expect("slot checked above");
            slot.plan.name = new_name.clone();
            if let Some(id) = slot.timer {
                self.timers.insert(id, new_name.clone());
            }
            self.slots.insert(new_name.clone(), slot);
            final_name = new_name;
        }

        if let Some(interval_ms) = req.interval_ms {
            if interval_ms < MIN_INTERVAL_MS {
                return UpdateGroupResp {
                    error: ErrorCode::GroupParameterInvalid,
                    group: final_name,
                };
            }
            if let Some(group) = self.groups.get(&final_name) {
                group.update_interval(interval_ms);
            }
            // Re-arm immediately rather than waiting for the next tick.
            let slot = self.slots.get_mut(&final_name).expect("slot checked above");
            if slot.armed_interval_ms != interval_ms {
                if let Some(old) = slot.timer.take() {
                    self.reactor.del_timer(old);
                    self.timers.remove(&old);
                }
                if self.ctx.status.state() == NodeState::Running {
                    let id = self.reactor.add_timer(
                        Duration::from_millis(interval_ms as u64),
                        self.ctx.descriptor.timer_kind,
                    );
                    self.timers.insert(id, final_name.clone());
                    slot.timer = Some(id);
                }
                slot.armed_interval_ms = interval_ms;
            }
        }

        UpdateGroupResp {
            error: ErrorCode::Success,
            group: final_name,
        }
    }

    // =========================================================================
    // Tag Operations
    // =========================================================================

    async fn add_tags(&mut self, req: TagReq) -> ErrorCode {
        let Some(group) = self.groups.get(&req.group) else {
            return ErrorCode::GroupNotExist;
        };
        if let Err(code) = self.validate_batch(&req.tags) {
            return code;
        }
        // The whole request commits or none of it does.
        for (i, tag) in req.tags.iter().enumerate() {
            if group.find_tag(&tag.name).is_some()
                || req.tags[..i].iter().any(|t| t.name == tag.name)
            {
                return ErrorCode::TagNameConflict;
            }
        }
        for tag in &req.tags {
            if group.add_tag(tag.clone()).is_err() {
                // Unreachable after the pre-check; keep the table consistent.
                return ErrorCode::TagNameConflict;
            }
        }
        if let Err(code) = self.plugin.add_tags(&req.group, &req.tags).await {
            tracing::warn!(node = %self.ctx.node(), group = %req.group, %code, "add_tags hook failed");
        }
        ErrorCode::Success
    }

    async fn update_tags(&mut self, req: TagReq) -> ErrorCode {
        let Some(group) = self.groups.get(&req.group) else {
            return ErrorCode::GroupNotExist;
        };
        if let Err(code) = self.validate_batch(&req.tags) {
            return code;
        }
        for tag in &req.tags {
            if group.find_tag(&tag.name).is_none() {
                return ErrorCode::TagNotExist;
            }
        }
        for tag in &req.tags {
            let _ = group.update_tag(tag.clone());
        }
        ErrorCode::Success
    }

    async fn del_tags(&mut self, req: DelTagReq) -> ErrorCode {
        let Some(group) = self.groups.get(&req.group) else {
            return ErrorCode::GroupNotExist;
        };
        for name in &req.tags {
            if group.find_tag(name).is_none() {
                return ErrorCode::TagNotExist;
            }
        }
        for name in &req.tags {
            let _ = group.del_tag(name);
        }
        if let Err(code) = self.plugin.del_tags(&req.group, &req.tags).await {
            tracing::warn!(node = %self.ctx.node(), group = %req.group, %code, "del_tags hook failed");
        }
        ErrorCode::Success
    }

    async fn add_gtags(&mut self, req: GTagReq) -> ErrorCode {
        // Validate everything before touching any group.
        for gt in &req.groups {
            if gt.group.is_empty() || gt.interval_ms < MIN_INTERVAL_MS {
                return ErrorCode::GroupParameterInvalid;
            }
            if let Err(code) = self.validate_batch(&gt.tags) {
                return code;
            }
            if let Some(group) = self.groups.get(&gt.group) {
                for tag in &gt.tags {
                    if group.find_tag(&tag.name).is_some() {
                        return ErrorCode::TagNameConflict;
                    }
                }
            }
        }

        let mut created: Vec<String> = Vec::new();
        for gt in &req.groups {
            if !self.groups.contains(&gt.group) {
                let code = self.add_group(AddGroupReq {
                    group: gt.group.clone(),
                    interval_ms: gt.interval_ms,
                });
                if code != ErrorCode::Success {
                    self.rollback_groups(&created);
                    return code;
                }
                created.push(gt.group.clone());
            }
            let group = self.groups.get(&gt.group).expect("group just ensured");
            for tag in &gt.tags {
                if let Err(code) = group.add_tag(tag.clone()) {
                    self.rollback_groups(&created);
                    return code;
                }
            }
            // Restored tags go through the load hook, fresh ones through add.
            let hook = if self.ctx.load {
                self.plugin.load_tags(&gt.group, &gt.tags).await
            } else {
                self.plugin.add_tags(&gt.group, &gt.tags).await
            };
            if let Err(code) = hook {
                tracing::warn!(node = %self.ctx.node(), group = %gt.group, %code, "tag hook failed");
            }
        }
        ErrorCode::Success
    }

    fn rollback_groups(&mut self, created: &[String]) {
        for name in created {
            let _ = self.del_group(DelGroupReq {
                group: name.clone(),
            });
        }
    }

    fn validate_batch(&self, tags: &[Tag]) -> Result<(), ErrorCode> {
        for tag in tags {
            self.plugin.validate_tag(tag)?;
        }
        self.plugin.tag_validator(tags)
    }

    // =========================================================================
    // Subscription Bookkeeping
    // =========================================================================

    fn subscribe(&mut self, req: SubscribeReq) {
        let Some(slot) = self.slots.get_mut(&req.group) else {
            tracing::warn!(
                node = %self.ctx.node(),
                group = %req.group,
                "subscribe for unknown group"
            );
            return;
        };
        if let Some(existing) = slot.subscribers.iter_mut().find(|s| s.app == req.app) {
            existing.params = req.params;
        } else {
            slot.subscribers.push(AppSubscription {
                app: req.app,
                params: req.params,
            });
        }
    }

    fn unsubscribe(&mut self, req: UnsubscribeReq) {
        if let Some(slot) = self.slots.get_mut(&req.group) {
            slot.subscribers.retain(|s| s.app != req.app);
        }
    }

    // =========================================================================
    // Data Plane Requests
    // =========================================================================

    async fn write_tag(&mut self, req: WriteTagReq) -> ErrorCode {
        let Some(group) = self.groups.get(&req.group) else {
            return ErrorCode::GroupNotExist;
        };
        let Some(tag) = group.find_tag(&req.tag) else {
            return ErrorCode::TagNotExist;
        };
        if !tag.attribute_test(Attribute::WRITE) {
            return ErrorCode::Internal;
        }
        let value = match value_from_json(tag.tag_type, &req.value) {
            Ok(value) => value,
            Err(code) => return code,
        };
        self.plugin.write_tag(&tag, value).await
    }

    async fn write_tags(&mut self, req: WriteTagsReq) -> ErrorCode {
        let Some(group) = self.groups.get(&req.group) else {
            return ErrorCode::GroupNotExist;
        };
        let mut pairs = Vec::with_capacity(req.tags.len());
        for item in &req.tags {
            let Some(tag) = group.find_tag(&item.tag) else {
                return ErrorCode::TagNotExist;
            };
            if !tag.attribute_test(Attribute::WRITE) {
                return ErrorCode::Internal;
            }
            let value = match value_from_json(tag.tag_type, &item.value) {
                Ok(value) => value,
                Err(code) => return code,
            };
            pairs.push((tag, value));
        }
        let codes = self.plugin.write_tags(&pairs).await;
        codes
            .into_iter()
            .find(|code| !code.is_ok())
            .unwrap_or(ErrorCode::Success)
    }

    async fn read_group(&mut self, req: ReadGroupReq) -> ReadGroupResp {
        let driver = self.ctx.node();
        let Some(group) = self.groups.get(&req.group) else {
            return ReadGroupResp {
                driver,
                group: req.group,
                error: ErrorCode::GroupNotExist,
                values: Vec::new(),
            };
        };
        let Some(slot) = self.slots.get_mut(&req.group) else {
            return ReadGroupResp {
                driver,
                group: req.group,
                error: ErrorCode::GroupNotExist,
                values: Vec::new(),
            };
        };

        if group.is_changed(slot.cached_rev) {
            rebuild_plan(&group, slot);
            if let Err(code) = self.plugin.group_sync(&mut slot.plan).await {
                tracing::warn!(node = %driver, group = %req.group, %code, "group sync failed");
            }
        }
        match self.plugin.group_timer(&mut slot.plan).await {
            Ok(mut values) => {
                for tag in &slot.static_tags {
                    if let Ok(value) = tag.get_static_value() {
                        values.push(TagValue::new(tag.name.clone(), value));
                    }
                }
                ReadGroupResp {
                    driver,
                    group: req.group,
                    error: ErrorCode::Success,
                    values,
                }
            }
            Err(code) => ReadGroupResp {
                driver,
                group: req.group,
                error: code,
                values: Vec::new(),
            },
        }
    }
}

/// Rebuilds a slot's plan from the group's current revision.
fn rebuild_plan(group: &Group, slot: &mut GroupSlot) {
    group.change_test(slot.cached_rev, |rev, static_tags, other_tags, interval| {
        slot.cached_rev = rev;
        slot.static_tags = static_tags;
        slot.plan.tags = other_tags;
        slot.plan.interval_ms = interval;
        // The compiled read plan is stale once the tag set moved.
        slot.plan.user_data = None;
    });
}
