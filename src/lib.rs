//! VM work job dispatching and resource state-change notification.
//!
//! [`dispatch::VmWorkJobDispatcher`] turns persisted jobs into typed
//! [`work::VmWork`] items and routes them to named handlers, reporting
//! exactly one completion per job. [`events::ResourceStateNotifier`]
//! listens on a [`fsm::StateMachine`] and publishes every transition it
//! sees while publishing is switched on.

pub mod app;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod fsm;
pub mod handlers;
pub mod job;
pub mod logging;
pub mod ui;
pub mod work;
