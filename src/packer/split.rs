use crate::constraint::{Anchor, EffectiveConstraint};
use crate::geometry::{Rect, Size, EPSILON};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Replacement cells for one node, tiling it exactly, with the index of the
/// cell the incoming rectangle occupies.
#[derive(Debug, Clone)]
pub struct SplitPlan {
    pub cells: Vec<Rect>,
    pub target: usize,
}

/// Size the candidate wants inside `avail` (node size with margins already
/// subtracted), or `None` when even the minimum cannot be honoured.
///
/// Preferred sizes are scaled by the pass-2 reduction `scale` but never
/// below the declared minimum; a don't-care axis stretches to the available
/// extent; a non-zero aspect shrinks the box until the ratio holds exactly.
pub fn fit_rect(
    constraint: &EffectiveConstraint,
    scale: f64,
    avail: Size,
    bounding: Size,
) -> Option<Size> {
    let min = constraint.min_size_px(bounding);
    if !min.fits_within(avail) {
        return None;
    }

    let mut width = constraint
        .pref_width_px(bounding)
        .map(|w| (w * scale).max(min.width))
        .unwrap_or(avail.width)
        .min(avail.width);
    let mut height = constraint
        .pref_height_px(bounding)
        .map(|h| (h * scale).max(min.height))
        .unwrap_or(avail.height)
        .min(avail.height);

    if constraint.aspect > 0.0 {
        let from_width = width * constraint.aspect;
        if from_width > height + EPSILON {
            width = height / constraint.aspect;
        } else {
            height = from_width;
        }
    }

    if width + EPSILON < min.width || height + EPSILON < min.height {
        return None;
    }
    Some(Size::new(width, height))
}

fn wants(anchors: &[Anchor], anchor: Anchor) -> bool {
    anchors.contains(&anchor)
}

/// Whether the node may host a rectangle with these anchors: an anchored
/// edge requires the node to touch that edge of the host region, a centre
/// anchor requires the region midpoint to fall inside the node.
pub fn anchor_ok(node: &Rect, anchors: &[Anchor], bounding: Size) -> bool {
    anchors.iter().all(|anchor| match anchor {
        Anchor::Top => node.y <= EPSILON,
        Anchor::Left => node.x <= EPSILON,
        Anchor::Right => node.right() + EPSILON >= bounding.width,
        Anchor::Bottom => node.bottom() + EPSILON >= bounding.height,
        Anchor::VCenter => {
            let mid = bounding.height / 2.0;
            node.y <= mid + EPSILON && node.bottom() + EPSILON >= mid
        }
        Anchor::HCenter => {
            let mid = bounding.width / 2.0;
            node.x <= mid + EPSILON && node.right() + EPSILON >= mid
        }
    })
}

/// Split `node` so one cell takes exactly `cell` (rectangle plus margins).
///
/// Cuts run along the axis with the larger leftover first; centre anchors
/// switch to a three-way split around the region midpoint. Returns `None`
/// when a produced cell would violate the node bounds.
pub fn split_plan(node: Rect, cell: Size, anchors: &[Anchor], bounding: Size) -> Option<SplitPlan> {
    let leftover_x = node.width - cell.width;
    let leftover_y = node.height - cell.height;
    if leftover_x < -EPSILON || leftover_y < -EPSILON {
        return None;
    }

    let plan = if wants(anchors, Anchor::VCenter) {
        split_centre(node, cell, anchors, bounding, Axis::Y)?
    } else if wants(anchors, Anchor::HCenter) {
        split_centre(node, cell, anchors, bounding, Axis::X)?
    } else {
        split_corner(node, cell, anchors, leftover_x, leftover_y)
    };

    for rect in &plan.cells {
        if rect.width < -EPSILON || rect.height < -EPSILON || !node.contains_rect(rect) {
            return None;
        }
    }
    Some(plan)
}

/// Two successive guillotine cuts placing the cell in the anchored corner
/// (top-left by default).
fn split_corner(node: Rect, cell: Size, anchors: &[Anchor], leftover_x: f64, leftover_y: f64) -> SplitPlan {
    let at_right = wants(anchors, Anchor::Right) && !wants(anchors, Anchor::Left);
    let at_bottom = wants(anchors, Anchor::Bottom) && !wants(anchors, Anchor::Top);

    let cell_x = if at_right { node.right() - cell.width } else { node.x };
    let cell_y = if at_bottom {
        node.bottom() - cell.height
    } else {
        node.y
    };

    let mut cells = Vec::with_capacity(3);
    let target_rect = Rect::new(cell_x, cell_y, cell.width, cell.height);

    // Cut the longer leftover off first so the remainder stays chunky.
    if leftover_x >= leftover_y {
        if leftover_x > EPSILON {
            let strip_x = if at_right { node.x } else { node.x + cell.width };
            cells.push(Rect::new(strip_x, node.y, leftover_x, node.height));
        }
        if leftover_y > EPSILON {
            let strip_y = if at_bottom { node.y } else { node.y + cell.height };
            cells.push(Rect::new(cell_x, strip_y, cell.width, leftover_y));
        }
    } else {
        if leftover_y > EPSILON {
            let strip_y = if at_bottom { node.y } else { node.y + cell.height };
            cells.push(Rect::new(node.x, strip_y, node.width, leftover_y));
        }
        if leftover_x > EPSILON {
            let strip_x = if at_right { node.x } else { node.x + cell.width };
            cells.push(Rect::new(strip_x, cell_y, leftover_x, cell.height));
        }
    }

    cells.push(target_rect);
    sort_cells(&mut cells);
    let target = cells
        .iter()
        .position(|r| *r == target_rect)
        .expect("target cell present");
    SplitPlan { cells, target }
}

/// Three-way split centring the cell on the region midpoint along `axis`
/// (top slice, centred cell, bottom slice, plus the off-axis remainder).
///
/// Only legal when the midpoint falls within reach of the node, so the
/// centred cell stays inside it.
fn split_centre(
    node: Rect,
    cell: Size,
    anchors: &[Anchor],
    bounding: Size,
    axis: Axis,
) -> Option<SplitPlan> {
    let (mid, node_start, node_len, cell_len) = match axis {
        Axis::Y => (bounding.height / 2.0, node.y, node.height, cell.height),
        Axis::X => (bounding.width / 2.0, node.x, node.width, cell.width),
    };

    let centred_start = (mid - cell_len / 2.0)
        .max(node_start)
        .min(node_start + node_len - cell_len);
    if centred_start < node_start - EPSILON {
        return None;
    }

    let lead = centred_start - node_start;
    let trail = node_start + node_len - (centred_start + cell_len);
    if lead < -EPSILON || trail < -EPSILON {
        return None;
    }

    let mut cells = Vec::with_capacity(4);
    let target_rect;
    match axis {
        Axis::Y => {
            if lead > EPSILON {
                cells.push(Rect::new(node.x, node.y, node.width, lead));
            }
            let at_right = wants(anchors, Anchor::Right) && !wants(anchors, Anchor::Left);
            let cell_x = if at_right { node.right() - cell.width } else { node.x };
            target_rect = Rect::new(cell_x, centred_start, cell.width, cell.height);
            let off = node.width - cell.width;
            if off > EPSILON {
                let strip_x = if at_right { node.x } else { node.x + cell.width };
                cells.push(Rect::new(strip_x, centred_start, off, cell.height));
            }
            if trail > EPSILON {
                cells.push(Rect::new(
                    node.x,
                    centred_start + cell.height,
                    node.width,
                    trail,
                ));
            }
        }
        Axis::X => {
            if lead > EPSILON {
                cells.push(Rect::new(node.x, node.y, lead, node.height));
            }
            let at_bottom = wants(anchors, Anchor::Bottom) && !wants(anchors, Anchor::Top);
            let cell_y = if at_bottom {
                node.bottom() - cell.height
            } else {
                node.y
            };
            target_rect = Rect::new(centred_start, cell_y, cell.width, cell.height);
            let off = node.height - cell.height;
            if off > EPSILON {
                let strip_y = if at_bottom { node.y } else { node.y + cell.height };
                cells.push(Rect::new(centred_start, strip_y, cell.width, off));
            }
            if trail > EPSILON {
                cells.push(Rect::new(
                    centred_start + cell.width,
                    node.y,
                    trail,
                    node.height,
                ));
            }
        }
    }

    cells.push(target_rect);
    sort_cells(&mut cells);
    let target = cells
        .iter()
        .position(|r| *r == target_rect)
        .expect("target cell present");
    Some(SplitPlan { cells, target })
}

fn sort_cells(cells: &mut [Rect]) {
    cells.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));
}

/// Split lengths for an occupied node shared between its occupant and an
/// incoming rectangle, following the pair-priority rule:
/// both-don't-care splits midway growing the larger minimum, a single
/// finite preference takes exactly its preference, two finite preferences
/// give the higher-priority side its preference when the remainder still
/// covers the other side's minimum.
///
/// Returns `(existing_len, incoming_len)`.
#[allow(clippy::too_many_arguments)]
pub fn pair_split_lengths(
    total: f64,
    existing_pref: Option<f64>,
    existing_min: f64,
    existing_priority: i32,
    incoming_pref: Option<f64>,
    incoming_min: f64,
    incoming_priority: i32,
) -> Option<(f64, f64)> {
    if existing_min + incoming_min > total + EPSILON {
        return None;
    }

    let min_based = |grow_existing: bool| -> Option<(f64, f64)> {
        let mid = total / 2.0;
        let (existing_len, incoming_len) = if grow_existing {
            let existing_len = mid.max(existing_min);
            (existing_len, total - existing_len)
        } else {
            let incoming_len = mid.max(incoming_min);
            (total - incoming_len, incoming_len)
        };
        (existing_len + EPSILON >= existing_min && incoming_len + EPSILON >= incoming_min)
            .then_some((existing_len, incoming_len))
    };
    let grow_existing = existing_min > incoming_min
        || (existing_min == incoming_min && existing_priority >= incoming_priority);

    match (existing_pref, incoming_pref) {
        (None, None) => min_based(grow_existing),
        (Some(pref), None) => {
            let existing_len = pref.max(existing_min);
            let incoming_len = (total - existing_len).max(incoming_min);
            let existing_len = total - incoming_len;
            (existing_len + EPSILON >= existing_min).then_some((existing_len, incoming_len))
        }
        (None, Some(pref)) => {
            let incoming_len = pref.max(incoming_min);
            let existing_len = (total - incoming_len).max(existing_min);
            let incoming_len = total - existing_len;
            (incoming_len + EPSILON >= incoming_min).then_some((existing_len, incoming_len))
        }
        (Some(e_pref), Some(i_pref)) => {
            if existing_priority >= incoming_priority {
                let existing_len = e_pref.max(existing_min);
                if total - existing_len + EPSILON >= incoming_min {
                    return Some((existing_len, total - existing_len));
                }
            } else {
                let incoming_len = i_pref.max(incoming_min);
                if total - incoming_len + EPSILON >= existing_min {
                    return Some((total - incoming_len, incoming_len));
                }
            }
            min_based(grow_existing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{ConstraintConfig, SizeSpec};
    use crate::model::{Component, ComponentState, Device, DeviceCapabilities, PriorityOverrides};

    fn constraint(config: ConstraintConfig) -> EffectiveConstraint {
        let component = Component {
            id: "c".to_string(),
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
        let device = Device {
            id: "d".to_string(),
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
            group: "g".to_string(),
            orientation: None,
        };
        crate::constraint::resolve(&component, &config, &device).unwrap()
    }

    #[test]
    fn fit_honours_aspect_within_pref_box() {
        let con = constraint(ConstraintConfig {
            aspect: Some("16:9".to_string()),
            pref_size: Some(SizeSpec::px(1920.0, 810.0)),
            min_size: Some(SizeSpec::px(800.0, 450.0)),
            ..ConstraintConfig::default()
        });
        let bounding = Size::new(1920.0, 1080.0);
        let size = fit_rect(&con, 1.0, bounding, bounding).unwrap();
        assert_eq!(size, Size::new(1440.0, 810.0));
        assert!((size.height / size.width - 0.5625).abs() < 1e-3);
    }

    #[test]
    fn fit_fails_below_min() {
        let con = constraint(ConstraintConfig {
            min_size: Some(SizeSpec::px(800.0, 450.0)),
            ..ConstraintConfig::default()
        });
        let bounding = Size::new(1920.0, 1080.0);
        assert!(fit_rect(&con, 1.0, Size::new(500.0, 500.0), bounding).is_none());
    }

    #[test]
    fn reduction_scale_floors_at_min() {
        let con = constraint(ConstraintConfig {
            pref_size: Some(SizeSpec::px(1000.0, 1000.0)),
            min_size: Some(SizeSpec::px(900.0, 900.0)),
            ..ConstraintConfig::default()
        });
        let bounding = Size::new(1920.0, 1080.0);
        let size = fit_rect(&con, 0.5, bounding, bounding).unwrap();
        assert_eq!(size, Size::new(900.0, 900.0));
    }

    #[test]
    fn corner_split_covers_node() {
        let node = Rect::new(0.0, 0.0, 1920.0, 1080.0);
        let plan = split_plan(
            node,
            Size::new(500.0, 600.0),
            &[],
            Size::new(1920.0, 1080.0),
        )
        .unwrap();
        let total: f64 = plan.cells.iter().map(|c| c.area()).sum();
        assert!((total - node.area()).abs() < 1e-6);
        assert_eq!(plan.cells[plan.target].size(), Size::new(500.0, 600.0));
        assert_eq!(plan.cells[plan.target].position(), crate::geometry::Point::new(0.0, 0.0));
    }

    #[test]
    fn right_anchor_places_cell_at_right_edge() {
        let node = Rect::new(0.0, 0.0, 1000.0, 400.0);
        let plan = split_plan(
            node,
            Size::new(300.0, 400.0),
            &[Anchor::Right],
            Size::new(1000.0, 400.0),
        )
        .unwrap();
        let cell = plan.cells[plan.target];
        assert_eq!(cell.x, 700.0);
        assert_eq!(cell.right(), 1000.0);
    }

    #[test]
    fn vcenter_split_centres_on_region_midpoint() {
        let node = Rect::new(0.0, 0.0, 1000.0, 1000.0);
        let plan = split_plan(
            node,
            Size::new(400.0, 200.0),
            &[Anchor::VCenter],
            Size::new(1000.0, 1000.0),
        )
        .unwrap();
        let cell = plan.cells[plan.target];
        assert_eq!(cell.y, 400.0);
        assert_eq!(cell.bottom(), 600.0);
        let total: f64 = plan.cells.iter().map(|c| c.area()).sum();
        assert!((total - node.area()).abs() < 1e-6);
    }

    #[test]
    fn anchor_ok_requires_edge_contact() {
        let bounding = Size::new(100.0, 100.0);
        let at_origin = Rect::new(0.0, 0.0, 50.0, 50.0);
        let inner = Rect::new(25.0, 25.0, 50.0, 50.0);
        assert!(anchor_ok(&at_origin, &[Anchor::Top, Anchor::Left], bounding));
        assert!(!anchor_ok(&inner, &[Anchor::Top], bounding));
        assert!(anchor_ok(&inner, &[Anchor::VCenter], bounding));
    }

    #[test]
    fn pair_split_single_pref_takes_its_length() {
        let (existing, incoming) =
            pair_split_lengths(1000.0, Some(600.0), 100.0, 5, None, 100.0, 3).unwrap();
        assert_eq!(existing, 600.0);
        assert_eq!(incoming, 400.0);
    }

    #[test]
    fn pair_split_clamps_remainder_to_min() {
        let (existing, incoming) =
            pair_split_lengths(1000.0, Some(950.0), 100.0, 5, None, 200.0, 3).unwrap();
        assert_eq!(incoming, 200.0);
        assert_eq!(existing, 800.0);
    }

    #[test]
    fn pair_split_both_dont_care_grows_larger_min() {
        let (existing, incoming) =
            pair_split_lengths(1000.0, None, 700.0, 5, None, 100.0, 3).unwrap();
        assert_eq!(existing, 700.0);
        assert_eq!(incoming, 300.0);
    }

    #[test]
    fn pair_split_fails_when_minimums_exceed_total() {
        assert!(pair_split_lengths(100.0, None, 80.0, 5, None, 40.0, 3).is_none());
    }

    #[test]
    fn pair_split_higher_priority_pref_wins() {
        let (existing, incoming) =
            pair_split_lengths(1000.0, Some(700.0), 100.0, 10, Some(500.0), 100.0, 5).unwrap();
        assert_eq!(existing, 700.0);
        assert_eq!(incoming, 300.0);
    }
}
