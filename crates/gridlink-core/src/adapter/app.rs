// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! The app adapter: consumes snapshots, forwards control notifications to
//! its plugin, and routes responses for app-originated requests back by
//! context.

use crate::adapter::AdapterContext;
use crate::error::ErrorCode;
use crate::message::{Body, Context, Envelope, RespError};
use crate::metrics::METRIC_RECV_MSGS;
use crate::plugin::AppPlugin;
use crate::reactor::{Reactor, ReactorEvent};
use crate::types::{NodeName, NodeState};

// =============================================================================
// AppAdapter
// =============================================================================

/// One running app node.
pub struct AppAdapter {
    ctx: AdapterContext,
    plugin: Box<dyn AppPlugin>,
    reactor: Reactor,
    setting: Option<String>,
}

impl AppAdapter {
    /// Assembles the adapter; [`run`](Self::run) drives it.
    pub fn new(ctx: AdapterContext, plugin: Box<dyn AppPlugin>) -> Self {
        let reactor = Reactor::new(ctx.node().into_inner());
        let setting = ctx.setting.clone();
        Self {
            ctx,
            plugin,
            reactor,
            setting,
        }
    }

    /// The adapter control loop. Returns when the node is uninitialized.
    pub async fn run(mut self) {
        self.ctx.register_base_metrics();

        let env = self.ctx.plugin_env();
        if let Err(code) = self.plugin.init(env, self.ctx.load).await {
            tracing::error!(node = %self.ctx.node(), %code, "app init failed");
            self.ctx.status.set_state(NodeState::Stopped);
            return;
        }
        if let Some(setting) = self.setting.clone() {
            if let Err(code) = self.plugin.setting(&setting).await {
                tracing::warn!(node = %self.ctx.node(), %code, "app setting rejected");
            }
        }
        self.ctx.status.set_state(NodeState::Ready);

        let mailbox = self.ctx.mailbox.take().expect("mailbox present at spawn");
        let _source = self.reactor.add_mailbox(mailbox.into_receiver());

        loop {
            match self.reactor.poll().await {
                ReactorEvent::Mail(envelope) => {
                    self.ctx.metrics.update(METRIC_RECV_MSGS, 1);
                    if !self.handle_mail(envelope).await {
                        break;
                    }
                }
                ReactorEvent::Tick(_) => {}
                ReactorEvent::SourceClosed(_) => break,
            }
        }

        self.reactor.close();
        self.ctx.status.set_state(NodeState::Stopped);
    }

    /// Handles one envelope; `false` ends the control loop.
    async fn handle_mail(&mut self, envelope: Envelope) -> bool {
        let Envelope {
            sender,
            context,
            body,
            ..
        } = envelope;

        match body {
            Body::TransData(data) => {
                if let Err(code) = self.plugin.on_snapshot(&data).await {
                    tracing::debug!(
                        node = %self.ctx.node(),
                        driver = %data.driver,
                        group = %data.group,
                        %code,
                        "snapshot rejected by plugin"
                    );
                }
            }
            Body::SubscribeGroup(req) | Body::UpdateSubscribeGroup(req) => {
                if let Err(code) = self.plugin.on_subscribe(&req).await {
                    tracing::warn!(node = %self.ctx.node(), %code, "subscribe hook failed");
                }
            }
            Body::UnsubscribeGroup(req) => {
                if let Err(code) = self.plugin.on_unsubscribe(&req).await {
                    tracing::warn!(node = %self.ctx.node(), %code, "unsubscribe hook failed");
                }
            }
            Body::NodeDeleted(deleted) => {
                let _ = self.plugin.on_node_deleted(&deleted.node).await;
            }
            Body::NodesState(states) => {
                let _ = self.plugin.on_nodes_state(&states).await;
            }
            resp @ (Body::RespError(_) | Body::ReadGroupResp(_)) => {
                // Response to a request this app originated.
                let _ = self.plugin.on_response(context, &resp).await;
            }
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
                let body = Body::GetNodeSettingResp(crate::message::NodeSettingResp {
                    error: ErrorCode::Success,
                    setting: self.setting.clone(),
                });
                self.ctx
                    .send(Envelope::with_context(self.ctx.node(), sender, context, body));
            }
            Body::NodeRename(req) => {
                *self.ctx.name.write() = req.new_name;
                self.reply(sender, context, ErrorCode::Success);
            }
            Body::NodeUninit => {
                if self.ctx.status.state() == NodeState::Running {
                    let _ = self.plugin.stop().await;
                }
                if let Err(code) = self.plugin.uninit().await {
                    tracing::warn!(node = %self.ctx.node(), %code, "app uninit failed");
                }
                self.reply(sender, context, ErrorCode::Success);
                return false;
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

    async fn node_ctl(&mut self, ctl: crate::message::NodeCtl) -> ErrorCode {
        match ctl {
            crate::message::NodeCtl::Start => {
                if self.ctx.status.state() == NodeState::Running {
                    return ErrorCode::Success;
                }
                if let Err(code) = self.plugin.start().await {
                    return code;
                }
                self.ctx.status.set_state(NodeState::Running);
                ErrorCode::Success
            }
            crate::message::NodeCtl::Stop => {
                if self.ctx.status.state() == NodeState::Running {
                    if let Err(code) = self.plugin.stop().await {
                        return code;
                    }
                    self.ctx.status.set_state(NodeState::Ready);
                }
                ErrorCode::Success
            }
        }
    }

    fn reply(&self, receiver: NodeName, context: Context, error: ErrorCode) {
        let body = Body::RespError(RespError { error });
        self.ctx
            .send(Envelope::with_context(self.ctx.node(), receiver, context, body));
    }
}
