use std::collections::BTreeMap;

use serde_json::json;

use crate::geometry::Rect;
use crate::model::{
    Component, ComponentId, Context, CoordValue, DeviceId, DeviceLayout, GroupId, Layout,
    NotPlacedRecord, PlacedComponent, PlacementStatus, PositionValue, SizeValue,
};
use crate::packer::Candidate;

/// Packed candidates for one group, with the workspace's device mapping.
#[derive(Debug, Clone)]
pub struct GroupResult {
    pub group: GroupId,
    /// Device ids in workspace-local order.
    pub device_ids: Vec<DeviceId>,
    pub candidates: Vec<Candidate>,
}

/// Deterministic instance identifier for one placed component.
pub fn instance_id(context: &str, dmapp: &str, device: &str, component: &str) -> String {
    format!("{context}-{dmapp}-{device}-{component}")
}

/// Render a pixel value for the wire: integer pixels, or a percent string
/// against the region extent when `percent` is set.
pub fn to_coord(value: f64, extent: f64, percent: bool) -> CoordValue {
    if percent {
        CoordValue::Percent(px_to_percent(value, extent))
    } else {
        CoordValue::Px(value.round() as i64)
    }
}

pub fn px_to_percent(value: f64, extent: f64) -> String {
    if extent <= 0.0 {
        return "0%".to_string();
    }
    format!("{:.4}%", value / extent * 100.0)
}

pub fn percent_to_px(value: &str, extent: f64) -> Option<f64> {
    let trimmed = value.strip_suffix('%')?;
    let ratio: f64 = trimmed.trim().parse().ok()?;
    Some(ratio / 100.0 * extent)
}

/// Hash over the mutable component state the differ watches: priorities,
/// parameters and the lifecycle marks. Hashing keeps the persisted layout
/// free of full component records.
pub fn state_hash(component: &Component) -> String {
    let device: BTreeMap<_, _> = component.priorities.device.iter().collect();
    let group: BTreeMap<_, _> = component.priorities.group.iter().collect();
    let digest = blake3::hash(
        json!([
            device,
            group,
            component.priorities.context,
            component.parameters,
            component.start_time,
            component.stop_time,
        ])
        .to_string()
        .as_bytes(),
    );
    digest.to_hex().to_string()
}

fn status_rank(status: PlacementStatus) -> u8 {
    match status {
        PlacementStatus::NoDevice => 0,
        PlacementStatus::Incompatible => 1,
        PlacementStatus::Skipped => 2,
        PlacementStatus::NoDependent => 3,
    }
}

/// Collect packed group results into the persist-ready layout.
///
/// Every context device gets an entry so the differ can tell a fresh device
/// from a fresh component. A component lands in `not_placed` only when none
/// of its candidates in the group found a node; the most specific failure
/// wins.
pub fn assemble(
    context: &Context,
    dmapp: &str,
    results: &[GroupResult],
    lookup: impl Fn(&str) -> Option<Component>,
    timestamp: u64,
) -> Layout {
    let mut devices: Vec<DeviceLayout> = context
        .devices
        .iter()
        .map(|device| DeviceLayout {
            device_id: device.id.clone(),
            components: Vec::new(),
        })
        .collect();

    let mut not_placed: BTreeMap<(GroupId, u8), Vec<ComponentId>> = BTreeMap::new();

    for result in results {
        for candidate in &result.candidates {
            let Some(placement) = &candidate.placement else {
                continue;
            };
            let device_id = &result.device_ids[placement.device];
            let percent = context.config.percent_coords;
            let partition_bounding = context
                .device(device_id)
                .map(|d| {
                    d.region_defs()
                        .into_iter()
                        .find(|r| r.id == placement.region)
                        .map(|r| (r.width, r.height))
                        .unwrap_or((d.display_size().width, d.display_size().height))
                })
                .unwrap_or((0.0, 0.0));

            let rect: Rect = placement.rect;
            let placed = PlacedComponent {
                component_id: candidate.component_id.clone(),
                device_id: device_id.clone(),
                region_id: placement.region.clone(),
                position: Some(PositionValue {
                    x: to_coord(rect.x, partition_bounding.0, percent),
                    y: to_coord(rect.y, partition_bounding.1, percent),
                }),
                size: Some(SizeValue {
                    width: to_coord(rect.width, partition_bounding.0, percent),
                    height: to_coord(rect.height, partition_bounding.1, percent),
                }),
                z_depth: 0,
                instance_id: instance_id(
                    &context.id,
                    dmapp,
                    device_id,
                    &candidate.component_id,
                ),
                timestamp,
                state_hash: lookup(&candidate.component_id)
                    .map(|c| state_hash(&c))
                    .unwrap_or_default(),
            };

            if let Some(entry) = devices.iter_mut().find(|d| &d.device_id == device_id) {
                // One appearance per device per layout.
                if !entry
                    .components
                    .iter()
                    .any(|c| c.component_id == candidate.component_id)
                {
                    entry.components.push(placed);
                }
            }
        }

        // Components with no placed candidate in this group.
        let mut failed: BTreeMap<ComponentId, u8> = BTreeMap::new();
        for candidate in &result.candidates {
            if candidate.placement.is_some() {
                continue;
            }
            let placed_elsewhere = result.candidates.iter().any(|other| {
                other.component_id == candidate.component_id && other.placement.is_some()
            });
            if placed_elsewhere {
                continue;
            }
            let status = candidate.failure.unwrap_or(PlacementStatus::Skipped);
            let rank = status_rank(status);
            failed
                .entry(candidate.component_id.clone())
                .and_modify(|existing| *existing = (*existing).max(rank))
                .or_insert(rank);
        }
        for (component, rank) in failed {
            not_placed
                .entry((result.group.clone(), rank))
                .or_default()
                .push(component);
        }
    }

    let not_placed = not_placed
        .into_iter()
        .map(|((group, rank), components)| NotPlacedRecord {
            group,
            status: match rank {
                0 => PlacementStatus::NoDevice,
                1 => PlacementStatus::Incompatible,
                2 => PlacementStatus::Skipped,
                _ => PlacementStatus::NoDependent,
            },
            components,
        })
        .collect();

    Layout {
        context_id: context.id.clone(),
        dmapp_id: dmapp.to_string(),
        timestamp,
        devices,
        not_placed,
        regions: context.logical_regions(),
    }
}
