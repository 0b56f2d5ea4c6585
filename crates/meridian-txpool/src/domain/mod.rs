//! Domain layer: queues, cache and transaction representations.

pub mod block_info;
pub mod check_queue;
pub mod errors;
pub mod schedule_queue;
pub mod seen_cache;
pub mod transaction;
