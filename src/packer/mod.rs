//! Packer module orchestrator following the RSB module specification.
//!
//! `order` prioritises candidate rectangles, `split` holds the node split
//! geometry, and `core` runs the three placement passes.

mod core;
mod order;
mod split;

pub use core::{pack, pack_simulation, PackReport, PackSettings};
pub use order::{
    capability_ok, order_candidates, partition_accepts, Candidate, CandidateScope, Placement,
};
pub use split::{anchor_ok, fit_rect, pair_split_lengths, split_plan, Axis, SplitPlan};
