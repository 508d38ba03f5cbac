use crate::constraint::EffectiveConstraint;
use crate::geometry::Size;
use crate::model::{Context, Device, Group};

use super::node::{RegionPartition, UndoLog, UndoOp};

/// Remaining concurrent audio/video slots for one device.
///
/// Attributed to the host device rather than individual nodes, and
/// initialised fresh for every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaBudget {
    pub audio: u32,
    pub video: u32,
}

/// Per-group packing state: one partition per logical region plus the
/// per-device media budgets. All of it lives in the call frame of one
/// evaluation.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Context device indices, group order.
    pub device_indices: Vec<usize>,
    pub communal: Vec<bool>,
    pub budgets: Vec<MediaBudget>,
    pub partitions: Vec<RegionPartition>,
}

impl Workspace {
    /// Build the packing workspace for one group: one root node per logical
    /// region (or per device display when no regions are declared), with
    /// orientation already applied to the reported sizes.
    pub fn build(context: &Context, group: &Group) -> Self {
        let mut device_indices = Vec::with_capacity(group.devices.len());
        let mut communal = Vec::with_capacity(group.devices.len());
        let mut budgets = Vec::with_capacity(group.devices.len());
        let mut partitions = Vec::new();

        for (local, &context_index) in group.devices.iter().enumerate() {
            let device = &context.devices[context_index];
            device_indices.push(context_index);
            communal.push(device.capabilities.communal);
            budgets.push(MediaBudget {
                audio: device.capabilities.concurrent_audio,
                video: device.capabilities.concurrent_video,
            });
            for region in device.region_defs() {
                partitions.push(RegionPartition::new(
                    local,
                    region.id,
                    Size::new(region.width, region.height),
                ));
            }
        }

        Self {
            device_indices,
            communal,
            budgets,
            partitions,
        }
    }

    pub fn device<'a>(&self, context: &'a Context, local: usize) -> &'a Device {
        &context.devices[self.device_indices[local]]
    }

    /// Whether the device can take another occupant with this constraint's
    /// media flags.
    pub fn budget_ok(&self, local: usize, constraint: &EffectiveConstraint) -> bool {
        let budget = &self.budgets[local];
        (!constraint.audio || budget.audio > 0) && (!constraint.video || budget.video > 0)
    }

    pub fn debit(&mut self, local: usize, constraint: &EffectiveConstraint, log: &mut UndoLog) {
        if !constraint.audio && !constraint.video {
            return;
        }
        let budget = &mut self.budgets[local];
        if constraint.audio {
            budget.audio -= 1;
        }
        if constraint.video {
            budget.video -= 1;
        }
        log.push(UndoOp::Debit {
            device: local,
            audio: constraint.audio,
            video: constraint.video,
        });
    }

    pub fn credit(&mut self, local: usize, constraint: &EffectiveConstraint) {
        let budget = &mut self.budgets[local];
        if constraint.audio {
            budget.audio += 1;
        }
        if constraint.video {
            budget.video += 1;
        }
    }

    /// Roll the workspace back to the given undo mark.
    pub fn rollback(&mut self, log: &mut UndoLog, mark: usize) {
        for op in log.drain_to(mark).into_iter().rev() {
            match op {
                UndoOp::Debit {
                    device,
                    audio,
                    video,
                } => {
                    let budget = &mut self.budgets[device];
                    if audio {
                        budget.audio += 1;
                    }
                    if video {
                        budget.video += 1;
                    }
                }
                UndoOp::Splice { partition, .. } | UndoOp::Occupy { partition, .. } => {
                    let index = partition;
                    let op_partition = &mut self.partitions[index];
                    op_partition.apply_undo(op);
                }
            }
        }
    }

    /// Total uncovered area across all partitions.
    pub fn free_area(&self) -> f64 {
        self.partitions.iter().map(|p| p.free_area()).sum()
    }
}
