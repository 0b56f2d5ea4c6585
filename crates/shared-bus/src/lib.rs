//! # Shared Bus - In-Process Notification Primitives
//!
//! Two primitives used throughout the pipeline:
//!
//! - [`Broker`]: a typed broadcast fan-out. Publishing never blocks; slow
//!   subscribers lose the oldest values. Block streams use the
//!   replay-latest mode so a new subscriber immediately observes the
//!   current block before the live stream continues.
//! - [`Nudge`]: a capacity-1 "there is work to do" channel. Enqueueing
//!   never blocks and redundant signals coalesce into one; the signal
//!   itself is never lost.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broker;
pub mod nudge;

pub use broker::{Broker, Subscription};
pub use nudge::Nudge;

/// Default number of values buffered per subscriber before the oldest are
/// dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
