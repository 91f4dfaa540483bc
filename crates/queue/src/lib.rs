//! Redis list-backed FIFO queue client.
//!
//! Producers append alert payloads to the tail of a named list; the
//! pipeline pops from the head with a bounded wait. The client owns an
//! explicit connection-state machine and repairs wrong-typed keys before
//! use.

pub mod client;

pub use client::{QueueClient, QueueConfig, QueueError};
