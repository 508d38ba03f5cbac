use serde_json::Value;

use crate::model::{
    Component, Context, CoordValue, Layout, NotPlacedRecord, PlacedComponent, PlacementStatus,
    PositionValue, PriorityOverrides, SizeValue,
};

use super::assemble::{instance_id, state_hash};
use super::messages::{
    next_message_id, CreateMessage, DestroyMessage, LogicalRegionChangeMessage, MessageLayout,
    UpdateMessage, CREATE_LEAD_NS,
};

/// Differential between the previous and the new layout, ready for the
/// caller's push transport.
#[derive(Debug, Clone, Default)]
pub struct Diff {
    pub create: Vec<CreateMessage>,
    pub update: Vec<UpdateMessage>,
    pub destroy: Vec<DestroyMessage>,
    pub not_placed: Vec<NotPlacedRecord>,
    pub logical_region_change: Vec<LogicalRegionChangeMessage>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.update.is_empty()
            && self.destroy.is_empty()
            && self.logical_region_change.is_empty()
    }
}

fn message_layout(placed: &PlacedComponent) -> MessageLayout {
    MessageLayout {
        instance_id: placed.instance_id.clone(),
        position: placed.position.clone(),
        size: placed.size.clone(),
        z_depth: Some(placed.z_depth),
        region_id: Some(placed.region_id.clone()),
        device_id: Some(placed.device_id.clone()),
    }
}

struct ComponentInfo {
    config: Value,
    parameters: Value,
    priorities: PriorityOverrides,
    start_time: Option<f64>,
    stop_time: Option<f64>,
}

fn component_info(component: Option<&Component>) -> ComponentInfo {
    match component {
        Some(c) => ComponentInfo {
            config: c.config.clone(),
            parameters: c.parameters.clone(),
            priorities: c.priorities.clone(),
            start_time: c.start_time,
            stop_time: c.stop_time,
        },
        None => ComponentInfo {
            config: Value::Null,
            parameters: Value::Null,
            priorities: PriorityOverrides::default(),
            start_time: None,
            stop_time: None,
        },
    }
}

/// Carry-over rules applied to the new layout before comparing, then the
/// create/update/destroy record sets per device.
///
/// Message ids are allocated create first, update second, destroy last, so
/// they increase strictly in that order within one evaluation.
pub fn diff(
    previous: Option<&Layout>,
    layout: &mut Layout,
    context: &Context,
    lookup: impl Fn(&str) -> Option<Component>,
) -> Diff {
    carry_over_inited(previous, layout, context, &lookup);
    carry_over_hidden(previous, layout, context, &lookup);

    let mut result = Diff {
        not_placed: layout.not_placed.clone(),
        ..Diff::default()
    };

    let update_ts = layout.timestamp;
    let create_ts = layout.timestamp.saturating_sub(CREATE_LEAD_NS);

    // Creates.
    for device in &layout.devices {
        let prev_device = previous.and_then(|p| p.device(&device.device_id));
        for placed in &device.components {
            let existed = prev_device
                .map(|d| {
                    d.components
                        .iter()
                        .any(|c| c.component_id == placed.component_id)
                })
                .unwrap_or(false);
            if existed {
                continue;
            }
            let info = component_info(lookup(&placed.component_id).as_ref());
            // Fresh-init form when the device itself is new to the layout.
            let layout_fragment = if prev_device.is_none() {
                MessageLayout::instance_only(placed.instance_id.clone())
            } else {
                message_layout(placed)
            };
            result.create.push(CreateMessage {
                message_id: next_message_id(),
                timestamp: create_ts,
                component_id: placed.component_id.clone(),
                context_id: layout.context_id.clone(),
                dmapp_id: layout.dmapp_id.clone(),
                device_id: device.device_id.clone(),
                config: info.config,
                start_time: info.start_time,
                stop_time: info.stop_time,
                layout: layout_fragment,
                parameters: info.parameters,
                priorities: info.priorities,
            });
        }
    }

    // Updates.
    if let Some(previous) = previous {
        for device in &layout.devices {
            let Some(prev_device) = previous.device(&device.device_id) else {
                continue;
            };
            for placed in &device.components {
                let Some(prev_placed) = prev_device
                    .components
                    .iter()
                    .find(|c| c.component_id == placed.component_id)
                else {
                    continue;
                };
                let changed = placed.position != prev_placed.position
                    || placed.size != prev_placed.size
                    || placed.state_hash != prev_placed.state_hash;
                if !changed {
                    continue;
                }
                let info = component_info(lookup(&placed.component_id).as_ref());
                result.update.push(UpdateMessage {
                    message_id: next_message_id(),
                    timestamp: update_ts,
                    component_id: placed.component_id.clone(),
                    context_id: layout.context_id.clone(),
                    dmapp_id: layout.dmapp_id.clone(),
                    device_id: device.device_id.clone(),
                    start_time: info.start_time,
                    stop_time: info.stop_time,
                    layout: message_layout(placed),
                    parameters: info.parameters,
                    priorities: info.priorities,
                });
            }
        }

        // Destroys.
        for prev_device in &previous.devices {
            let new_device = layout.device(&prev_device.device_id);
            for prev_placed in &prev_device.components {
                let survives = new_device
                    .map(|d| {
                        d.components
                            .iter()
                            .any(|c| c.component_id == prev_placed.component_id)
                    })
                    .unwrap_or(false);
                if survives {
                    continue;
                }
                let info = component_info(lookup(&prev_placed.component_id).as_ref());
                result.destroy.push(DestroyMessage {
                    message_id: next_message_id(),
                    timestamp: update_ts,
                    component_id: prev_placed.component_id.clone(),
                    context_id: layout.context_id.clone(),
                    dmapp_id: layout.dmapp_id.clone(),
                    device_id: prev_device.device_id.clone(),
                    stop_time: info.stop_time,
                    instance_id: prev_placed.instance_id.clone(),
                });
            }
        }

        if previous.regions != layout.regions {
            result.logical_region_change.push(LogicalRegionChangeMessage {
                message_id: next_message_id(),
                timestamp: update_ts,
                logical_regions: layout.regions.clone(),
            });
        }
    }

    result
}

/// Rule 1: a component initialised but never started must not be lost when
/// the packer leaves it out; re-attach it on its previous device with an
/// empty layout.
fn carry_over_inited(
    previous: Option<&Layout>,
    layout: &mut Layout,
    _context: &Context,
    lookup: &impl Fn(&str) -> Option<Component>,
) {
    let Some(previous) = previous else {
        return;
    };
    for prev_device in &previous.devices {
        for prev_placed in &prev_device.components {
            let Some(component) = lookup(&prev_placed.component_id) else {
                continue;
            };
            if !component.is_active() || component.start_time.is_some() {
                continue;
            }
            if !layout.devices_for(&prev_placed.component_id).is_empty() {
                continue;
            }
            let timestamp = layout.timestamp;
            let Some(device) = layout.device_mut(&prev_device.device_id) else {
                continue;
            };
            device.components.push(PlacedComponent {
                component_id: prev_placed.component_id.clone(),
                device_id: prev_device.device_id.clone(),
                region_id: prev_placed.region_id.clone(),
                position: None,
                size: None,
                z_depth: 0,
                instance_id: prev_placed.instance_id.clone(),
                timestamp,
                state_hash: state_hash(&component),
            });
            // Re-attached entries are not failures.
            for record in &mut layout.not_placed {
                record
                    .components
                    .retain(|c| c != &prev_placed.component_id);
            }
        }
    }
    layout.not_placed.retain(|r| !r.components.is_empty());
}

/// Rule 2: a running component squeezed out of the layout is re-inserted on
/// its previous device with the explicit hidden size so clients hide it
/// instead of losing it.
fn carry_over_hidden(
    previous: Option<&Layout>,
    layout: &mut Layout,
    context: &Context,
    lookup: &impl Fn(&str) -> Option<Component>,
) {
    let Some(previous) = previous else {
        return;
    };
    let records: Vec<NotPlacedRecord> = layout
        .not_placed
        .iter()
        .filter(|r| {
            matches!(
                r.status,
                PlacementStatus::Incompatible | PlacementStatus::Skipped
            )
        })
        .cloned()
        .collect();

    for record in records {
        for component_id in &record.components {
            let Some(component) = lookup(component_id) else {
                continue;
            };
            if !component.is_running() {
                continue;
            }
            let prev_devices: Vec<String> = previous
                .devices_for(component_id)
                .into_iter()
                .cloned()
                .collect();
            for device_id in prev_devices {
                let in_group = context
                    .device(&device_id)
                    .map(|d| d.group == record.group)
                    .unwrap_or(false);
                if !in_group {
                    continue;
                }
                if layout
                    .component_on_device(&device_id, component_id)
                    .is_some()
                {
                    continue;
                }
                let instance =
                    instance_id(&layout.context_id, &layout.dmapp_id, &device_id, component_id);
                let timestamp = layout.timestamp;
                let hash = state_hash(&component);
                let prev_region = previous
                    .component_on_device(&device_id, component_id)
                    .map(|c| c.region_id.clone())
                    .unwrap_or_else(|| device_id.clone());
                if let Some(device) = layout.device_mut(&device_id) {
                    device.components.push(PlacedComponent {
                        component_id: component_id.clone(),
                        device_id: device_id.clone(),
                        region_id: prev_region,
                        position: Some(PositionValue {
                            x: CoordValue::Px(0),
                            y: CoordValue::Px(0),
                        }),
                        size: Some(SizeValue {
                            width: CoordValue::Px(-1),
                            height: CoordValue::Px(-1),
                        }),
                        z_depth: 0,
                        instance_id: instance,
                        timestamp,
                        state_hash: hash,
                    });
                }
            }
        }
    }
}
