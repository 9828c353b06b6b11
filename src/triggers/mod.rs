//! Inbound runtimes that feed messages to the distribution consumer.

mod stream;

pub use stream::{
    apply_settlement, reclaim_action, settle, EntrySettler, Reclaim, ReclaimSchedule,
    RedisStreamTrigger, Settlement, StreamConfig,
};
