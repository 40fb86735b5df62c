//! Cadence testing utilities.
//!
//! - [`transactions`]: transactions and a decoder for them.
//! - [`chain`]: chains of committed blocks.
//! - [`network`]: an in-memory peer-to-peer transport serving those blocks.
//! - [`channels`]: assertions on channels.

pub mod channels;
pub mod chain;
pub mod network;
pub mod transactions;
