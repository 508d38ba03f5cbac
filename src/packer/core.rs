use std::collections::HashSet;

use crate::constraint::{Anchor, EffectiveConstraint};
use crate::geometry::{Rect, Size, EPSILON};
use crate::logging::{LogEvent, Logger};
use crate::model::{Context, ContextConfig, PlacementStatus};
use crate::region::{UndoLog, Workspace};

use super::order::{capability_ok, order_candidates, partition_accepts, Candidate, Placement};
use super::split::{anchor_ok, fit_rect, pair_split_lengths, split_plan, Axis};

/// Pass-2 knobs, taken from the context configuration.
#[derive(Debug, Clone, Copy)]
pub struct PackSettings {
    pub reduce_factor: f64,
    pub reduce_tries: u32,
}

impl PackSettings {
    pub fn from_config(config: &ContextConfig) -> Self {
        Self {
            reduce_factor: config.reduce_factor,
            reduce_tries: config.reduce_tries,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PackReport {
    pub placed: usize,
    pub rejected: usize,
    pub reduction_rounds: usize,
    pub beautify_accepted: usize,
}

/// Run the full three-pass packer over one group's workspace.
pub fn pack(
    workspace: &mut Workspace,
    candidates: &mut Vec<Candidate>,
    context: &Context,
    settings: &PackSettings,
    logger: Option<&Logger>,
) -> PackReport {
    order_candidates(candidates, workspace, context);
    let mut log = UndoLog::new();

    pass_initial(workspace, candidates, context, &mut log);
    let reduction_rounds = pass_reduce(workspace, candidates, context, settings, &mut log);
    let beautify_accepted = pass_beautify(workspace, candidates, context, &mut log);
    finalise_failures(candidates);

    let report = PackReport {
        placed: candidates.iter().filter(|c| c.placement.is_some()).count(),
        rejected: candidates.iter().filter(|c| c.placement.is_none()).count(),
        reduction_rounds,
        beautify_accepted,
    };

    if let Some(logger) = logger {
        logger.emit(
            LogEvent::debug("mosaic::packer", "group_packed")
                .with("placed", report.placed as u64)
                .with("rejected", report.rejected as u64)
                .with("reduction_rounds", report.reduction_rounds as u64)
                .with("beautify_accepted", report.beautify_accepted as u64),
        );
    }
    report
}

/// Pass 1 only, used by simulation: coverage does not matter there, only
/// the set of viable devices.
pub fn pack_simulation(
    workspace: &mut Workspace,
    candidates: &mut Vec<Candidate>,
    context: &Context,
) {
    order_candidates(candidates, workspace, context);
    let mut log = UndoLog::new();
    pass_initial(workspace, candidates, context, &mut log);
    finalise_failures(candidates);
}

/// Pass 1: place every pending candidate in order, splitting occupied nodes
/// as a fallback.
fn pass_initial(
    workspace: &mut Workspace,
    candidates: &mut Vec<Candidate>,
    context: &Context,
    log: &mut UndoLog,
) {
    for index in 0..candidates.len() {
        if !candidates[index].is_pending() {
            continue;
        }
        if let Err(status) = place_candidate(workspace, candidates, index, context, log) {
            candidates[index].failure = Some(status);
        }
    }
}

fn place_candidate(
    workspace: &mut Workspace,
    candidates: &mut [Candidate],
    index: usize,
    context: &Context,
    log: &mut UndoLog,
) -> Result<(), PlacementStatus> {
    let required_device = dependency_device(candidates, index)?;

    let mut saw_capability = false;
    let mut saw_geometry = false;

    for pi in 0..workspace.partitions.len() {
        let device = workspace.partitions[pi].device;
        if required_device.is_some_and(|d| d != device) {
            continue;
        }
        let Some(constraint) = candidates[index].constraint_for(device).cloned() else {
            continue;
        };
        let device_ref = workspace.device(context, device);
        if !capability_ok(&constraint, device_ref)
            || !constraint.region_allowed(&workspace.partitions[pi].region)
        {
            continue;
        }
        saw_capability = true;

        let bounding = workspace.partitions[pi].bounding;
        // Mixed-unit min/pref conflicts only materialise against a concrete
        // bounding size; treat them like impossible geometry rather than
        // letting the fit clamp past the declared preference.
        if constraint.min_exceeds_pref(bounding) {
            continue;
        }
        let min = constraint.min_size_px(bounding);
        let padded = Size::new(
            min.width + 2.0 * constraint.margin,
            min.height + 2.0 * constraint.margin,
        );
        if !padded.fits_within(bounding) {
            continue;
        }
        saw_geometry = true;

        if !workspace.budget_ok(device, &constraint) {
            continue;
        }
        let scale = candidates[index].scale;
        if let Some(placement) =
            try_place_in_partition(workspace, pi, index, &constraint, scale, log)
        {
            candidates[index].placement = Some(placement);
            return Ok(());
        }
    }

    // No unoccupied node matched; try splitting an occupied node whose
    // occupant does not care about one of its dimensions.
    for pi in 0..workspace.partitions.len() {
        let device = workspace.partitions[pi].device;
        if required_device.is_some_and(|d| d != device) {
            continue;
        }
        for ni in 0..workspace.partitions[pi].len() {
            if workspace.partitions[pi].node(ni).occupant.is_none() {
                continue;
            }
            if try_occupied_split(workspace, candidates, index, pi, ni, context, log) {
                return Ok(());
            }
        }
    }

    if !saw_capability {
        return Err(PlacementStatus::NoDevice);
    }
    if !saw_geometry {
        return Err(PlacementStatus::Incompatible);
    }
    Err(PlacementStatus::Skipped)
}

/// Resolve `componentDependency` targets: every target must already be
/// placed, and with `componentDeviceDependency` the candidate is pinned to
/// the target's device.
fn dependency_device(
    candidates: &[Candidate],
    index: usize,
) -> Result<Option<usize>, PlacementStatus> {
    let deps = candidates[index].dependencies().to_vec();
    if deps.is_empty() {
        return Ok(None);
    }
    let device_dependency = candidates[index]
        .representative()
        .map(|c| c.device_dependency)
        .unwrap_or(false);

    let mut required = None;
    for dep in &deps {
        let target = candidates
            .iter()
            .find(|c| &c.component_id == dep && c.placement.is_some());
        let Some(target) = target else {
            return Err(PlacementStatus::NoDependent);
        };
        if device_dependency {
            let device = target.placement.as_ref().expect("placed target").device;
            match required {
                None => required = Some(device),
                Some(existing) if existing != device => {
                    return Err(PlacementStatus::NoDependent)
                }
                _ => {}
            }
        }
    }
    Ok(required)
}

fn try_place_in_partition(
    workspace: &mut Workspace,
    pi: usize,
    candidate: usize,
    constraint: &EffectiveConstraint,
    scale: f64,
    log: &mut UndoLog,
) -> Option<Placement> {
    let bounding = workspace.partitions[pi].bounding;
    for ni in 0..workspace.partitions[pi].len() {
        let node = workspace.partitions[pi].node(ni);
        if node.occupant.is_some() {
            continue;
        }
        if !anchor_ok(&node.rect, &constraint.anchors, bounding) {
            continue;
        }
        if let Some(placement) =
            try_place_at(workspace, pi, ni, candidate, constraint, scale, log)
        {
            return Some(placement);
        }
    }
    None
}

fn try_place_at(
    workspace: &mut Workspace,
    pi: usize,
    ni: usize,
    candidate: usize,
    constraint: &EffectiveConstraint,
    scale: f64,
    log: &mut UndoLog,
) -> Option<Placement> {
    let bounding = workspace.partitions[pi].bounding;
    let node_rect = workspace.partitions[pi].node(ni).rect;
    let avail = Size::new(
        node_rect.width - 2.0 * constraint.margin,
        node_rect.height - 2.0 * constraint.margin,
    );
    if avail.width <= EPSILON || avail.height <= EPSILON {
        return None;
    }

    let rect = fit_rect(constraint, scale, avail, bounding)?;
    let cell = Size::new(
        rect.width + 2.0 * constraint.margin,
        rect.height + 2.0 * constraint.margin,
    );
    let plan = split_plan(node_rect, cell, &constraint.anchors, bounding)?;

    let mark = log.mark();
    let device = workspace.partitions[pi].device;
    let partition = &mut workspace.partitions[pi];
    let base = partition.splice(pi, ni, &plan.cells, log);
    let target = base + plan.target;
    partition.occupy(pi, target, candidate, log);
    let node_id = partition.node(target).id;
    let cell_rect = partition.node(target).rect;
    let region = partition.region.clone();
    workspace.debit(device, constraint, log);

    let placed_rect = cell_rect.inset(constraint.margin);
    // Split post-condition: the placed rectangle must stay inside the host
    // region and keep positive area. A violation unwinds the split.
    if placed_rect.width < 1.0 - EPSILON
        || placed_rect.height < 1.0 - EPSILON
        || !Rect::from_size(bounding).contains_rect(&placed_rect)
    {
        workspace.rollback(log, mark);
        return None;
    }

    log.commit(mark);
    workspace.partitions[pi].consolidate_around(node_id);
    Some(Placement {
        partition: pi,
        node: node_id,
        device,
        region,
        rect: placed_rect,
    })
}

fn anchors_conflict(existing: &[Anchor], incoming: &[Anchor], axis: Axis) -> bool {
    let both = |anchor: Anchor| existing.contains(&anchor) && incoming.contains(&anchor);
    match axis {
        Axis::X => {
            both(Anchor::Left)
                || both(Anchor::Right)
                || existing.contains(&Anchor::HCenter)
                || incoming.contains(&Anchor::HCenter)
        }
        Axis::Y => {
            both(Anchor::Top)
                || both(Anchor::Bottom)
                || existing.contains(&Anchor::VCenter)
                || incoming.contains(&Anchor::VCenter)
        }
    }
}

/// Split an occupied node between its occupant and the incoming candidate
/// along an axis the occupant does not care about.
fn try_occupied_split(
    workspace: &mut Workspace,
    candidates: &mut [Candidate],
    index: usize,
    pi: usize,
    ni: usize,
    context: &Context,
    log: &mut UndoLog,
) -> bool {
    let device = workspace.partitions[pi].device;
    let bounding = workspace.partitions[pi].bounding;
    let node = workspace.partitions[pi].node(ni).clone();
    let Some(occupant) = node.occupant else {
        return false;
    };
    let Some(incoming_con) = candidates[index].constraint_for(device).cloned() else {
        return false;
    };
    let Some(existing_con) = candidates[occupant].constraint_for(device).cloned() else {
        return false;
    };

    let device_ref = workspace.device(context, device);
    if !capability_ok(&incoming_con, device_ref)
        || !incoming_con.region_allowed(&workspace.partitions[pi].region)
        || !workspace.budget_ok(device, &incoming_con)
        || incoming_con.min_exceeds_pref(bounding)
    {
        return false;
    }

    let existing_scale = candidates[occupant].scale;
    let incoming_scale = candidates[index].scale;

    for axis in [Axis::X, Axis::Y] {
        let existing_pref = match axis {
            Axis::X => existing_con.pref_width_px(bounding),
            Axis::Y => existing_con.pref_height_px(bounding),
        };
        if existing_pref.is_some() {
            continue;
        }
        if anchors_conflict(&existing_con.anchors, &incoming_con.anchors, axis) {
            continue;
        }

        let total = match axis {
            Axis::X => node.rect.width,
            Axis::Y => node.rect.height,
        };
        let existing_min = existing_con.min_size_px(bounding);
        let incoming_min = incoming_con.min_size_px(bounding);
        let (existing_min_len, incoming_min_len, incoming_pref) = match axis {
            Axis::X => (
                existing_min.width + 2.0 * existing_con.margin,
                incoming_min.width + 2.0 * incoming_con.margin,
                incoming_con
                    .pref_width_px(bounding)
                    .map(|v| v * incoming_scale + 2.0 * incoming_con.margin),
            ),
            Axis::Y => (
                existing_min.height + 2.0 * existing_con.margin,
                incoming_min.height + 2.0 * incoming_con.margin,
                incoming_con
                    .pref_height_px(bounding)
                    .map(|v| v * incoming_scale + 2.0 * incoming_con.margin),
            ),
        };

        let Some((existing_len, incoming_len)) = pair_split_lengths(
            total,
            None,
            existing_min_len,
            existing_con.priority,
            incoming_pref,
            incoming_min_len,
            incoming_con.priority,
        ) else {
            continue;
        };

        let (existing_near, incoming_near, existing_far) = match axis {
            Axis::X => (
                existing_con.anchors.contains(&Anchor::Left),
                incoming_con.anchors.contains(&Anchor::Left),
                existing_con.anchors.contains(&Anchor::Right),
            ),
            Axis::Y => (
                existing_con.anchors.contains(&Anchor::Top),
                incoming_con.anchors.contains(&Anchor::Top),
                existing_con.anchors.contains(&Anchor::Bottom),
            ),
        };
        let existing_first = !existing_far && !(incoming_near && !existing_near);

        let (first_len, second_len) = if existing_first {
            (existing_len, incoming_len)
        } else {
            (incoming_len, existing_len)
        };
        let cells = match axis {
            Axis::X => [
                Rect::new(node.rect.x, node.rect.y, first_len, node.rect.height),
                Rect::new(
                    node.rect.x + first_len,
                    node.rect.y,
                    second_len,
                    node.rect.height,
                ),
            ],
            Axis::Y => [
                Rect::new(node.rect.x, node.rect.y, node.rect.width, first_len),
                Rect::new(
                    node.rect.x,
                    node.rect.y + first_len,
                    node.rect.width,
                    second_len,
                ),
            ],
        };
        let (existing_cell_off, incoming_cell_off) = if existing_first { (0, 1) } else { (1, 0) };

        let mark = log.mark();
        let partition = &mut workspace.partitions[pi];
        let base = partition.splice(pi, ni, &cells, log);
        let existing_index = base + existing_cell_off;
        let incoming_index = base + incoming_cell_off;
        let existing_cell = partition.node(existing_index).rect;
        let incoming_cell = partition.node(incoming_index).rect;

        // Both halves are re-aspect-corrected; a failed correction unwinds
        // the split.
        let refit = |con: &EffectiveConstraint, scale: f64, cell: Rect| -> Option<Rect> {
            let avail = Size::new(
                cell.width - 2.0 * con.margin,
                cell.height - 2.0 * con.margin,
            );
            if avail.width <= EPSILON || avail.height <= EPSILON {
                return None;
            }
            let size = fit_rect(con, scale, avail, bounding)?;
            if !anchor_ok(&cell, &con.anchors, bounding) {
                return None;
            }
            Some(Rect::new(
                cell.x + con.margin,
                cell.y + con.margin,
                size.width,
                size.height,
            ))
        };

        let existing_rect = refit(&existing_con, existing_scale, existing_cell);
        let incoming_rect = refit(&incoming_con, incoming_scale, incoming_cell);
        let (Some(existing_rect), Some(incoming_rect)) = (existing_rect, incoming_rect) else {
            workspace.rollback(log, mark);
            continue;
        };

        let partition = &mut workspace.partitions[pi];
        partition.occupy(pi, existing_index, occupant, log);
        partition.occupy(pi, incoming_index, index, log);
        let existing_id = partition.node(existing_index).id;
        let incoming_id = partition.node(incoming_index).id;
        let region = partition.region.clone();
        workspace.debit(device, &incoming_con, log);
        log.commit(mark);

        candidates[occupant].placement = Some(Placement {
            partition: pi,
            node: existing_id,
            device,
            region: region.clone(),
            rect: existing_rect,
        });
        candidates[index].placement = Some(Placement {
            partition: pi,
            node: incoming_id,
            device,
            region,
            rect: incoming_rect,
        });
        return true;
    }
    false
}

fn score(workspace: &Workspace, candidates: &[Candidate]) -> (usize, f64) {
    let placed = candidates.iter().filter(|c| c.placement.is_some()).count();
    (placed, workspace.free_area())
}

/// Pass 2: reduce preferred sizes and retry the regions that are not yet at
/// capacity, keeping the best attempt by (most placed, least white space).
fn pass_reduce(
    workspace: &mut Workspace,
    candidates: &mut Vec<Candidate>,
    context: &Context,
    settings: &PackSettings,
    log: &mut UndoLog,
) -> usize {
    let mut best_score = score(workspace, candidates);
    let mut best_state: Option<(Workspace, Vec<Candidate>)> = None;
    let mut rounds = 0;

    for iteration in 1..=settings.reduce_tries {
        let retry: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                matches!(
                    c.failure,
                    Some(PlacementStatus::Skipped | PlacementStatus::NoDependent)
                )
            })
            .map(|(i, _)| i)
            .collect();
        if retry.is_empty() {
            break;
        }

        // Regions already at capacity are preserved; only regions an
        // unplaced candidate could still use are reset.
        let reset: HashSet<usize> = workspace
            .partitions
            .iter()
            .enumerate()
            .filter(|(_, partition)| {
                partition.free_area() > EPSILON
                    && retry.iter().any(|&ci| {
                        partition_accepts(&candidates[ci], partition, context, workspace)
                            && min_fits(&candidates[ci], partition)
                    })
            })
            .map(|(pi, _)| pi)
            .collect();
        if reset.is_empty() {
            break;
        }

        rounds += 1;
        if best_state.is_none() {
            best_state = Some((workspace.clone(), candidates.clone()));
        }
        let factor = settings.reduce_factor.powi(iteration as i32);

        for ci in 0..candidates.len() {
            let Some(placement) = &candidates[ci].placement else {
                continue;
            };
            if !reset.contains(&placement.partition) {
                continue;
            }
            let device = placement.device;
            if let Some(constraint) = candidates[ci].constraint_for(device).cloned() {
                workspace.credit(device, &constraint);
            }
            candidates[ci].placement = None;
            candidates[ci].scale = factor;
        }
        for &pi in &reset {
            workspace.partitions[pi].reset();
        }
        for &ci in &retry {
            candidates[ci].failure = None;
            candidates[ci].scale = factor;
        }

        pass_initial(workspace, candidates, context, log);

        let current = score(workspace, candidates);
        if current.0 > best_score.0
            || (current.0 == best_score.0 && current.1 < best_score.1 - EPSILON)
        {
            best_score = current;
            best_state = Some((workspace.clone(), candidates.clone()));
        }

        let exhausted = candidates.iter().all(|c| {
            c.placement.is_some()
                || matches!(
                    c.failure,
                    Some(PlacementStatus::Incompatible | PlacementStatus::NoDevice)
                )
        });
        if exhausted || settings.reduce_factor >= 1.0 {
            break;
        }
    }

    if let Some((saved_workspace, saved_candidates)) = best_state {
        *workspace = saved_workspace;
        *candidates = saved_candidates;
    }
    rounds
}

fn min_fits(candidate: &Candidate, partition: &crate::region::RegionPartition) -> bool {
    let Some(constraint) = candidate.constraint_for(partition.device) else {
        return false;
    };
    let min = constraint.min_size_px(partition.bounding);
    Size::new(
        min.width + 2.0 * constraint.margin,
        min.height + 2.0 * constraint.margin,
    )
    .fits_within(partition.bounding)
}

/// Pass 3: rebuild each region that still has white space, large rectangles
/// first, and keep the rebuild only when it covers at least as well.
fn pass_beautify(
    workspace: &mut Workspace,
    candidates: &mut [Candidate],
    _context: &Context,
    log: &mut UndoLog,
) -> usize {
    let mut accepted = 0;

    for pi in 0..workspace.partitions.len() {
        if workspace.partitions[pi].free_area() <= EPSILON {
            continue;
        }
        let mut placed_here: Vec<usize> = (0..candidates.len())
            .filter(|&ci| {
                candidates[ci]
                    .placement
                    .as_ref()
                    .is_some_and(|p| p.partition == pi)
            })
            .collect();
        if placed_here.is_empty() {
            continue;
        }

        let saved_partition = workspace.partitions[pi].clone();
        let saved_budgets = workspace.budgets.clone();
        let saved_placements: Vec<(usize, Option<Placement>)> = placed_here
            .iter()
            .map(|&ci| (ci, candidates[ci].placement.clone()))
            .collect();
        let old_free = saved_partition.free_area();

        placed_here.sort_by(|&a, &b| {
            let area_a = candidates[a].placement.as_ref().expect("placed").rect.area();
            let area_b = candidates[b].placement.as_ref().expect("placed").rect.area();
            area_b.total_cmp(&area_a)
        });

        let device = workspace.partitions[pi].device;
        for &ci in &placed_here {
            if let Some(constraint) = candidates[ci].constraint_for(device).cloned() {
                workspace.credit(device, &constraint);
            }
            candidates[ci].placement = None;
        }
        workspace.partitions[pi].reset();

        let mut rebuilt = true;
        for &ci in &placed_here {
            let Some(constraint) = candidates[ci].constraint_for(device).cloned() else {
                rebuilt = false;
                break;
            };
            let scale = candidates[ci].scale;
            match try_place_in_partition(workspace, pi, ci, &constraint, scale, log) {
                Some(placement) => candidates[ci].placement = Some(placement),
                None => {
                    rebuilt = false;
                    break;
                }
            }
        }

        let new_free = workspace.partitions[pi].free_area();
        if rebuilt && new_free <= old_free + EPSILON {
            accepted += 1;
        } else {
            workspace.partitions[pi] = saved_partition;
            workspace.budgets = saved_budgets;
            for (ci, placement) in saved_placements {
                candidates[ci].placement = placement;
            }
        }

        if !workspace.partitions[pi].is_top_left_ordered() {
            workspace.partitions[pi].sort_top_left();
        }
    }
    accepted
}

/// Space failures of dependency-carrying candidates are attributed to the
/// dependency.
fn finalise_failures(candidates: &mut [Candidate]) {
    for candidate in candidates.iter_mut() {
        if candidate.placement.is_some() {
            candidate.failure = None;
            continue;
        }
        match candidate.failure {
            Some(PlacementStatus::Skipped) if !candidate.dependencies().is_empty() => {
                candidate.failure = Some(PlacementStatus::NoDependent);
            }
            None => candidate.failure = Some(PlacementStatus::Skipped),
            _ => {}
        }
    }
}
