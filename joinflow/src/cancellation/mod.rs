//! Deadline and cancellation signalling.
//!
//! This module provides:
//! - DeadlineToken, the read-only signal shared by every stage of a run
//! - CancelHandle, the idempotent trigger held by the run's owner
//! - CancelReason, which distinguishes deadline expiry from manual cancellation

mod token;

pub use token::{CancelCallback, CancelHandle, CancelReason, DeadlineToken};
