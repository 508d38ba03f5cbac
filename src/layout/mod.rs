//! Layout module orchestrator following the RSB module specification.
//!
//! `assemble` turns packed placements into the persist-ready layout,
//! `diff` compares it with the previous snapshot, and `messages` holds the
//! push-notification shapes.

mod assemble;
mod diff;
mod messages;

pub use assemble::{assemble, instance_id, percent_to_px, px_to_percent, state_hash, GroupResult};
pub use diff::{diff, Diff};
pub use messages::{
    next_message_id, ComponentPropertiesEntry, ComponentPropertiesMessage, CreateMessage,
    DestroyMessage, LogicalRegionChangeMessage, MessageLayout, UpdateMessage, CREATE_LEAD_NS,
};

pub use crate::model::CoordValue;
