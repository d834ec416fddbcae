// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host triggers: expiration

use crate::error::TriggerError;
use crate::handler::EventHandler;
use crate::TRIGGER_EXPIRATION;
use async_trait::async_trait;
use evg_db::{Db, OpContext};
use evg_model::event::{EventData, EventLogEntry, HostEventData, EVENT_EXPIRATION};
use evg_model::host::{self, Host, HOST_EXPIRED};
use evg_model::subscription::{Subscriber, SELECTOR_ID, SELECTOR_OBJECT, SELECTOR_OWNER};
use evg_model::{ModelError, Notification, NotificationPayload, Selector, Subscription, UiConfig};
use serde_json::json;
use tracing::warn;

#[derive(Default)]
pub struct HostTriggers {
    event_id: String,
    event_type: String,
    data: HostEventData,
    host: Host,
    ui_root: String,
}

#[async_trait]
impl EventHandler for HostTriggers {
    async fn fetch(
        &mut self,
        ctx: &OpContext,
        db: &Db,
        event: &EventLogEntry,
    ) -> Result<(), TriggerError> {
        let EventData::Host(data) = &event.data else {
            return Err(TriggerError::MismatchedEventData {
                event_id: event.id.clone(),
                expected: "host",
            });
        };
        self.event_id = event.id.clone();
        self.event_type = event.event_type.clone();
        self.data = data.clone();
        self.host = host::find_one_id(ctx, db, &event.resource_id)
            .await?
            .ok_or_else(|| ModelError::not_found("host", event.resource_id.clone()))?;
        self.ui_root = UiConfig::get(ctx, db).await?.url;
        Ok(())
    }

    fn selectors(&self) -> Vec<Selector> {
        vec![
            Selector::new(SELECTOR_ID, self.host.id.clone()),
            Selector::new(SELECTOR_OBJECT, "host"),
            Selector::new(SELECTOR_OWNER, self.host.started_by.clone()),
        ]
    }

    fn triggers(&self) -> &'static [&'static str] {
        &[TRIGGER_EXPIRATION]
    }

    async fn process(
        &self,
        _ctx: &OpContext,
        _db: &Db,
        subscription: &Subscription,
    ) -> Result<Option<Notification>, TriggerError> {
        let fires = subscription.trigger == TRIGGER_EXPIRATION
            && (self.event_type == EVENT_EXPIRATION || self.data.status == HOST_EXPIRED);
        if !fires {
            return Ok(None);
        }
        Ok(self.generate(subscription))
    }
}

impl HostTriggers {
    fn host_url(&self) -> String {
        format!("{}/host/{}", self.ui_root, self.host.id)
    }

    fn generate(&self, subscription: &Subscription) -> Option<Notification> {
        let host = &self.host;
        let payload = match &subscription.subscriber {
            Subscriber::EvergreenWebhook(hook) => NotificationPayload::Webhook {
                url: hook.url.clone(),
                secret: hook.secret.clone(),
                body: json!({
                    "id": host.id,
                    "host": host.host,
                    "status": HOST_EXPIRED,
                }),
            },
            Subscriber::Email(address) => NotificationPayload::Email {
                recipients: vec![address.clone()],
                subject: format!("Evergreen: host {} has expired", host.host),
                body: self.host_url(),
            },
            Subscriber::Slack(target) => NotificationPayload::Slack {
                target: target.clone(),
                msg: format!("Host <{}|{}> has expired", self.host_url(), host.host),
            },
            other => {
                warn!(
                    host_id = %host.id,
                    subscriber = other.type_name(),
                    "unsupported subscriber for host expiration"
                );
                return None;
            }
        };
        Some(Notification::new(
            &self.event_id,
            &subscription.id,
            subscription.subscriber.clone(),
            payload,
        ))
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
