// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! evg-trigger: Triggers and notification fan-out
//!
//! A trigger is a named condition on a resource that turns a logged
//! event into notifications for matching subscriptions. Each resource
//! type has an event handler; the fan-out resolves the handler for an
//! event, narrows the subscription registry through the handler's
//! selectors, and collects the notifications its triggers produce.

pub mod build;
pub mod error;
pub mod fanout;
pub mod handler;
pub mod host;
pub mod jira;
pub mod processor;
pub mod task;

pub use error::TriggerError;
pub use fanout::notifications_from_event;
pub use handler::{handler_for, EventHandler};
pub use processor::EventProcessor;

/// Trigger names shared across resource types
pub const TRIGGER_OUTCOME: &str = "outcome";
pub const TRIGGER_SUCCESS: &str = "success";
pub const TRIGGER_FAILURE: &str = "failure";
pub const TRIGGER_FIRST_FAILURE_IN_VERSION: &str = "first-failure-in-version";
pub const TRIGGER_REGRESSION: &str = "regression";
pub const TRIGGER_EXCEEDS_DURATION: &str = "exceeds-duration";
pub const TRIGGER_EXPIRATION: &str = "expiration";
