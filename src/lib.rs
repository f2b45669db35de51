//! Real-time conversation sync
//!
//! A shared [`bus::EventBus`] polls the chat service's event log and fans
//! entries out to per-conversation [`agent::ConvoAgent`]s, which keep an
//! optimistic, render-ready view of each open conversation.

pub mod agent;
pub mod api;
pub mod bus;
pub mod config;
pub mod retry;

#[cfg(test)]
mod testing;
