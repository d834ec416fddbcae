// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event handler trait and registry
//!
//! One handler per resource type. Handlers carry per-event state (the
//! event, its parsed payload, the fetched resource), so the registry
//! constructs a fresh instance for every event.

use crate::error::TriggerError;
use async_trait::async_trait;
use evg_db::{Db, OpContext};
use evg_model::event::{
    EventLogEntry, RESOURCE_TYPE_BUILD, RESOURCE_TYPE_HOST, RESOURCE_TYPE_TASK,
};
use evg_model::{Notification, Selector, Subscription};

/// Per-resource-type trigger evaluation
#[async_trait]
pub trait EventHandler: Send {
    /// Load the event's referenced resource into the handler; the
    /// resource being gone is an error
    async fn fetch(
        &mut self,
        ctx: &OpContext,
        db: &Db,
        event: &EventLogEntry,
    ) -> Result<(), TriggerError>;

    /// Event-intrinsic attributes used to narrow the subscription
    /// search
    fn selectors(&self) -> Vec<Selector>;

    /// The trigger names this handler implements
    fn triggers(&self) -> &'static [&'static str];

    /// Evaluate the subscription's trigger; `None` means the trigger
    /// does not apply to this event, which is not an error
    async fn process(
        &self,
        ctx: &OpContext,
        db: &Db,
        subscription: &Subscription,
    ) -> Result<Option<Notification>, TriggerError>;
}

/// A fresh handler for the given resource type
pub fn handler_for(resource_type: &str) -> Option<Box<dyn EventHandler>> {
    match resource_type {
        RESOURCE_TYPE_TASK => Some(Box::new(crate::task::TaskTriggers::default())),
        RESOURCE_TYPE_BUILD => Some(Box::new(crate::build::BuildTriggers::default())),
        RESOURCE_TYPE_HOST => Some(Box::new(crate::host::HostTriggers::default())),
        _ => None,
    }
}
