//! Polling orchestration.
//!
//! Ties the capture source, change detector, analysis collaborator,
//! history store, and notifier into the long-running watch loop.

pub mod poller;

pub use poller::{IterationOutcome, Poller, PollerSettings};
