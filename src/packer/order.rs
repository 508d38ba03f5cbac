use crate::constraint::EffectiveConstraint;
use crate::geometry::{Rect, Size, EPSILON};
use crate::model::{ComponentId, Context, Device, PlacementStatus, RegionId};
use crate::region::{NodeId, RegionPartition, Workspace};

/// Which devices of the group a candidate may land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateScope {
    /// Any communal device of the group, at most once.
    Communal,
    /// Pinned to one personal device (workspace-local index).
    Personal(usize),
}

/// A committed position for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub partition: usize,
    pub node: NodeId,
    /// Workspace-local device index.
    pub device: usize,
    pub region: RegionId,
    /// Region-local rectangle with the margin already applied.
    pub rect: Rect,
}

/// One rectangle the packer tries to place.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub component_index: usize,
    pub component_id: ComponentId,
    pub scope: CandidateScope,
    /// Effective constraint per workspace device; `None` where the device is
    /// outside the candidate's scope or resolution failed.
    pub constraints: Vec<Option<EffectiveConstraint>>,
    /// Multiplicative reduction applied to preferred sizes during pass 2.
    pub scale: f64,
    /// Insertion order; the final sorting tie-break.
    pub order: usize,
    pub placement: Option<Placement>,
    pub failure: Option<PlacementStatus>,
}

impl Candidate {
    pub fn constraint_for(&self, device: usize) -> Option<&EffectiveConstraint> {
        self.constraints.get(device).and_then(|c| c.as_ref())
    }

    /// Representative constraint for ordering decisions.
    pub fn representative(&self) -> Option<&EffectiveConstraint> {
        self.constraints.iter().flatten().next()
    }

    /// Highest effective priority across the candidate's devices.
    pub fn priority(&self) -> i32 {
        self.constraints
            .iter()
            .flatten()
            .map(|c| c.priority)
            .max()
            .unwrap_or(0)
    }

    pub fn is_pending(&self) -> bool {
        self.placement.is_none() && self.failure.is_none()
    }

    pub fn dependencies(&self) -> &[String] {
        self.representative()
            .map(|c| c.dependencies.as_slice())
            .unwrap_or(&[])
    }
}

/// Capability filter: flags the device cannot serve exclude every region it
/// hosts.
pub fn capability_ok(constraint: &EffectiveConstraint, device: &Device) -> bool {
    (!constraint.touch || device.capabilities.touch_interaction)
        && (!constraint.audio || device.capabilities.concurrent_audio > 0)
        && (!constraint.video || device.capabilities.concurrent_video > 0)
}

/// Whether the partition passes the candidate's capability filter (device
/// flags plus the target-region whitelist).
pub fn partition_accepts(
    candidate: &Candidate,
    partition: &RegionPartition,
    context: &Context,
    workspace: &Workspace,
) -> bool {
    let Some(constraint) = candidate.constraint_for(partition.device) else {
        return false;
    };
    let device = workspace.device(context, partition.device);
    capability_ok(constraint, device) && constraint.region_allowed(&partition.region)
}

/// Largest bounding size among partitions the candidate may use; drives the
/// preferred-area sort key.
fn largest_valid_bounding(
    candidate: &Candidate,
    workspace: &Workspace,
    context: &Context,
) -> Option<Size> {
    workspace
        .partitions
        .iter()
        .filter(|p| partition_accepts(candidate, p, context, workspace))
        .map(|p| p.bounding)
        .max_by(|a, b| a.area().total_cmp(&b.area()))
}

/// Order candidates for the packer and trim provably unplaceable ones.
///
/// Ordering: priority descending (priority 0 is filtered to `skipped`),
/// preferred pixel area descending, anchored before unanchored, anchor edge
/// order top/right/left/bottom, insertion order last. The insertion-order
/// tie-break makes the comparator strictly total, so equal-priority
/// equal-area rectangles order deterministically.
pub fn order_candidates(
    candidates: &mut Vec<Candidate>,
    workspace: &Workspace,
    context: &Context,
) {
    for candidate in candidates.iter_mut() {
        if candidate.failure.is_some() {
            continue;
        }
        if candidate.priority() == 0 {
            candidate.failure = Some(PlacementStatus::Skipped);
        }
    }

    let keys: std::collections::HashMap<usize, SortKey> = candidates
        .iter()
        .map(|candidate| {
            let bounding = largest_valid_bounding(candidate, workspace, context)
                .unwrap_or(Size::new(0.0, 0.0));
            let area = candidate
                .representative()
                .map(|c| c.pref_area_px(bounding))
                .unwrap_or(0.0);
            let (anchored, anchor_rank) = candidate
                .representative()
                .map(|c| (c.is_anchored(), c.anchor_rank()))
                .unwrap_or((false, u8::MAX));
            (
                candidate.order,
                SortKey {
                    priority: candidate.priority(),
                    area,
                    anchored,
                    anchor_rank,
                },
            )
        })
        .collect();

    candidates.sort_by(|a, b| {
        let ka = &keys[&a.order];
        let kb = &keys[&b.order];
        kb.priority
            .cmp(&ka.priority)
            .then_with(|| kb.area.total_cmp(&ka.area))
            .then_with(|| kb.anchored.cmp(&ka.anchored))
            .then_with(|| ka.anchor_rank.cmp(&kb.anchor_rank))
            .then_with(|| a.order.cmp(&b.order))
    });

    trim_unplaceable(candidates, workspace, context);
}

#[derive(Debug)]
struct SortKey {
    priority: i32,
    area: f64,
    anchored: bool,
    anchor_rank: u8,
}

/// Demote the tail that provably cannot fit even at minimum size, using a
/// conservative usable-area estimate per region.
fn trim_unplaceable(candidates: &mut [Candidate], workspace: &Workspace, context: &Context) {
    let mut remaining: Vec<f64> = workspace
        .partitions
        .iter()
        .map(|p| p.bounding.area())
        .collect();

    for candidate in candidates.iter_mut() {
        if candidate.failure.is_some() {
            continue;
        }
        let valid: Vec<usize> = workspace
            .partitions
            .iter()
            .enumerate()
            .filter(|(_, p)| partition_accepts(candidate, p, context, workspace))
            .map(|(pi, _)| pi)
            .collect();
        if valid.is_empty() {
            // Left for the packer to report as noDevice.
            continue;
        }

        let mut fits_somewhere = false;
        let mut area_somewhere = false;
        let mut min_areas: Vec<(usize, f64)> = Vec::with_capacity(valid.len());
        for &pi in &valid {
            let partition = &workspace.partitions[pi];
            let constraint = candidate
                .constraint_for(partition.device)
                .expect("valid partition has constraint");
            let min = constraint.min_size_px(partition.bounding);
            let padded = Size::new(
                min.width + 2.0 * constraint.margin,
                min.height + 2.0 * constraint.margin,
            );
            if padded.fits_within(partition.bounding) {
                fits_somewhere = true;
                if padded.area() <= remaining[pi] + EPSILON {
                    area_somewhere = true;
                }
            }
            min_areas.push((pi, padded.area()));
        }

        if !fits_somewhere || !area_somewhere {
            candidate.failure = Some(PlacementStatus::Incompatible);
            continue;
        }
        // Only single-region candidates consume the estimate, keeping the
        // trim provable for everything behind them.
        if let [(pi, area)] = min_areas.as_slice() {
            remaining[*pi] -= area;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{resolve, ConstraintConfig, SizeSpec};
    use crate::model::{
        Component, ComponentState, ContextConfig, DeviceCapabilities, PriorityOverrides,
    };

    fn context() -> Context {
        Context {
            id: "ctx".to_string(),
            dmapp: "app".to_string(),
            devices: vec![Device {
                id: "tv".to_string(),
                capabilities: DeviceCapabilities {
                    display_width: 1920.0,
                    display_height: 1080.0,
                    dpi: 96.0,
                    concurrent_audio: 1,
                    concurrent_video: 1,
                    touch_interaction: false,
                    communal: true,
                    orientations: vec![],
                },
                regions: vec![],
                group: "main".to_string(),
                orientation: None,
            }],
            config: ContextConfig::default(),
        }
    }

    fn candidate(order: usize, config: ConstraintConfig, context: &Context) -> Candidate {
        let component = Component {
            id: format!("comp-{order}"),
            constraint_id: None,
            state: ComponentState::Started,
            visible: true,
            start_time: None,
            stop_time: None,
            priorities: PriorityOverrides::default(),
            pref_size: None,
            config: serde_json::Value::Null,
            parameters: serde_json::Value::Null,
        };
        let constraint = resolve(&component, &config, &context.devices[0]).unwrap();
        Candidate {
            component_index: order,
            component_id: component.id,
            scope: CandidateScope::Communal,
            constraints: vec![Some(constraint)],
            scale: 1.0,
            order,
            placement: None,
            failure: None,
        }
    }

    fn workspace(context: &Context) -> Workspace {
        let groups = context.groups();
        Workspace::build(context, &groups[0])
    }

    #[test]
    fn priority_then_area_then_anchor() {
        let ctx = context();
        let ws = workspace(&ctx);
        let mut candidates = vec![
            candidate(
                0,
                ConstraintConfig {
                    priority: 5,
                    pref_size: Some(SizeSpec::px(100.0, 100.0)),
                    ..ConstraintConfig::default()
                },
                &ctx,
            ),
            candidate(
                1,
                ConstraintConfig {
                    priority: 10,
                    pref_size: Some(SizeSpec::px(50.0, 50.0)),
                    ..ConstraintConfig::default()
                },
                &ctx,
            ),
            candidate(
                2,
                ConstraintConfig {
                    priority: 5,
                    pref_size: Some(SizeSpec::px(100.0, 100.0)),
                    anchor: vec![crate::constraint::Anchor::Top],
                    ..ConstraintConfig::default()
                },
                &ctx,
            ),
        ];
        order_candidates(&mut candidates, &ws, &ctx);
        assert_eq!(candidates[0].order, 1);
        // Equal priority and area: the anchored one wins.
        assert_eq!(candidates[1].order, 2);
        assert_eq!(candidates[2].order, 0);
    }

    #[test]
    fn priority_zero_is_skipped() {
        let ctx = context();
        let ws = workspace(&ctx);
        let mut candidates = vec![candidate(
            0,
            ConstraintConfig {
                priority: 0,
                ..ConstraintConfig::default()
            },
            &ctx,
        )];
        order_candidates(&mut candidates, &ws, &ctx);
        assert_eq!(candidates[0].failure, Some(PlacementStatus::Skipped));
    }

    #[test]
    fn oversized_min_is_trimmed_to_incompatible() {
        let ctx = context();
        let ws = workspace(&ctx);
        let mut candidates = vec![candidate(
            0,
            ConstraintConfig {
                min_size: Some(SizeSpec::px(4000.0, 4000.0)),
                ..ConstraintConfig::default()
            },
            &ctx,
        )];
        order_candidates(&mut candidates, &ws, &ctx);
        assert_eq!(candidates[0].failure, Some(PlacementStatus::Incompatible));
    }

    #[test]
    fn insertion_order_breaks_exact_ties() {
        let ctx = context();
        let ws = workspace(&ctx);
        let config = ConstraintConfig {
            priority: 5,
            pref_size: Some(SizeSpec::px(100.0, 100.0)),
            ..ConstraintConfig::default()
        };
        let mut candidates = vec![
            candidate(1, config.clone(), &ctx),
            candidate(0, config, &ctx),
        ];
        order_candidates(&mut candidates, &ws, &ctx);
        assert_eq!(candidates[0].order, 0);
        assert_eq!(candidates[1].order, 1);
    }
}
