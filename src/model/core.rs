use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constraint::SizeSpec;
use crate::error::{EngineError, Result};
use crate::geometry::Size;

pub type ComponentId = String;
pub type DeviceId = String;
pub type RegionId = String;
pub type GroupId = String;
pub type ConstraintId = String;

/// Logical display region declared by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionDef {
    pub id: RegionId,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub resizable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapabilities {
    pub display_width: f64,
    pub display_height: f64,
    #[serde(default = "default_dpi")]
    pub dpi: f64,
    #[serde(default)]
    pub concurrent_audio: u32,
    #[serde(default)]
    pub concurrent_video: u32,
    #[serde(default)]
    pub touch_interaction: bool,
    #[serde(default)]
    pub communal: bool,
    #[serde(default)]
    pub orientations: Vec<Orientation>,
}

fn default_dpi() -> f64 {
    96.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: DeviceId,
    pub capabilities: DeviceCapabilities,
    #[serde(default)]
    pub regions: Vec<RegionDef>,
    #[serde(default = "default_group")]
    pub group: GroupId,
    #[serde(default)]
    pub orientation: Option<Orientation>,
}

fn default_group() -> GroupId {
    "default".to_string()
}

impl Device {
    /// Reported display size with the active orientation applied.
    pub fn display_size(&self) -> Size {
        let width = self.capabilities.display_width;
        let height = self.capabilities.display_height;
        let natural = if width >= height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        };
        match self.orientation {
            Some(active) if active != natural => Size::new(height, width),
            _ => Size::new(width, height),
        }
    }

    /// Declared regions, or one whole-display region named after the device.
    pub fn region_defs(&self) -> Vec<RegionDef> {
        if self.regions.is_empty() {
            let size = self.display_size();
            return vec![RegionDef {
                id: self.id.clone(),
                width: size.width,
                height: size.height,
                resizable: false,
            }];
        }
        self.regions.clone()
    }
}

/// Subset of context devices laid out together.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: GroupId,
    /// Indices into the context device list, in context order.
    pub devices: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Communal,
    Personal,
    Mixed,
}

impl Group {
    pub fn kind(&self, devices: &[Device]) -> GroupKind {
        let communal = self
            .devices
            .iter()
            .filter(|&&idx| devices[idx].capabilities.communal)
            .count();
        if communal == self.devices.len() {
            GroupKind::Communal
        } else if communal == 0 {
            GroupKind::Personal
        } else {
            GroupKind::Mixed
        }
    }
}

/// Per-context layout configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextConfig {
    #[serde(default)]
    pub percent_coords: bool,
    #[serde(default = "default_reduce_factor")]
    pub reduce_factor: f64,
    #[serde(default = "default_reduce_tries")]
    pub reduce_tries: u32,
}

fn default_reduce_factor() -> f64 {
    0.8
}

fn default_reduce_tries() -> u32 {
    5
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            percent_coords: false,
            reduce_factor: default_reduce_factor(),
            reduce_tries: default_reduce_tries(),
        }
    }
}

/// Session snapshot handed to the engine for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub id: String,
    pub dmapp: String,
    pub devices: Vec<Device>,
    #[serde(default)]
    pub config: ContextConfig,
}

impl Context {
    /// Derive groups from device group ids, in first-seen order.
    pub fn groups(&self) -> Vec<Group> {
        let mut order: Vec<GroupId> = Vec::new();
        let mut members: HashMap<GroupId, Vec<usize>> = HashMap::new();
        for (idx, device) in self.devices.iter().enumerate() {
            let entry = members.entry(device.group.clone()).or_insert_with(|| {
                order.push(device.group.clone());
                Vec::new()
            });
            entry.push(idx);
        }
        order
            .into_iter()
            .map(|id| {
                let devices = members.remove(&id).unwrap_or_default();
                Group { id, devices }
            })
            .collect()
    }

    pub fn device(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Logical region geometry for the whole context, used for change
    /// detection between evaluations.
    pub fn logical_regions(&self) -> Vec<LogicalRegion> {
        self.devices
            .iter()
            .flat_map(|device| {
                device.region_defs().into_iter().map(|region| LogicalRegion {
                    region_id: region.id,
                    device_id: device.id.clone(),
                    display_width: region.width,
                    display_height: region.height,
                    resizable: region.resizable,
                })
            })
            .collect()
    }
}

/// Declared lifecycle state of a component, driven by external transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComponentState {
    #[default]
    Uninitialised,
    Inited,
    Started,
    Stopped,
    Destroyed,
}

/// Priority overrides resolved in the fixed order device, group, context.
///
/// The reserved value −1 removes the override at its scope, falling through
/// to the next one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityOverrides {
    #[serde(default)]
    pub device: HashMap<DeviceId, i32>,
    #[serde(default)]
    pub group: HashMap<GroupId, i32>,
    #[serde(default)]
    pub context: Option<i32>,
}

impl PriorityOverrides {
    pub fn resolve(&self, device: &str, group: &str) -> Option<i32> {
        for value in [
            self.device.get(device).copied(),
            self.group.get(group).copied(),
            self.context,
        ]
        .into_iter()
        .flatten()
        {
            if value != -1 {
                return Some(value);
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.device.is_empty() && self.group.is_empty() && self.context.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: ComponentId,
    #[serde(default)]
    pub constraint_id: Option<ConstraintId>,
    #[serde(default)]
    pub state: ComponentState,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub stop_time: Option<f64>,
    #[serde(default)]
    pub priorities: PriorityOverrides,
    #[serde(default)]
    pub pref_size: Option<SizeSpec>,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub parameters: Value,
}

fn default_visible() -> bool {
    true
}

impl Component {
    pub fn is_active(&self) -> bool {
        self.state != ComponentState::Destroyed
    }

    /// Started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.start_time.is_some() && self.stop_time.is_none()
    }
}

/// Component collection for one DMApp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentSet {
    components: Vec<Component>,
}

impl ComponentSet {
    pub fn new(components: Vec<Component>) -> Self {
        Self { components }
    }

    pub fn get(&self, id: &str) -> Result<&Component> {
        self.components
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| EngineError::UnknownComponent(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    /// Components that participate in evaluation (everything not destroyed).
    pub fn active(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(|c| c.is_active())
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Coordinate on the wire: integer pixels, or a percent string when the
/// context sets `percentCoords`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoordValue {
    Px(i64),
    Percent(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionValue {
    pub x: CoordValue,
    pub y: CoordValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeValue {
    pub width: CoordValue,
    pub height: CoordValue,
}

/// One placed rectangle in the persisted layout.
///
/// Carry-over entries keep `position`/`size` unset (initialised but never
/// started) or carry the explicit hidden size `{-1,-1}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedComponent {
    pub component_id: ComponentId,
    pub device_id: DeviceId,
    pub region_id: RegionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<SizeValue>,
    pub z_depth: i32,
    pub instance_id: String,
    pub timestamp: u64,
    /// Content hash over priorities, parameters and lifecycle marks; the
    /// differ compares hashes instead of re-reading component records.
    #[serde(default)]
    pub state_hash: String,
}

impl PlacedComponent {
    /// The explicit hidden form clients interpret as "remove from screen".
    pub fn is_hidden(&self) -> bool {
        matches!(
            &self.size,
            Some(SizeValue {
                width: CoordValue::Px(-1),
                height: CoordValue::Px(-1),
            })
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLayout {
    pub device_id: DeviceId,
    pub components: Vec<PlacedComponent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlacementStatus {
    NoDevice,
    Incompatible,
    Skipped,
    NoDependent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotPlacedRecord {
    pub group: GroupId,
    pub status: PlacementStatus,
    pub components: Vec<ComponentId>,
}

/// Region geometry the layout was computed against; persisted so the next
/// evaluation can emit `logicalRegionChange` when devices move or resize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalRegion {
    pub region_id: RegionId,
    pub device_id: DeviceId,
    pub display_width: f64,
    pub display_height: f64,
    pub resizable: bool,
}

/// Persist-ready layout for one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub context_id: String,
    pub dmapp_id: String,
    /// Server timestamp, nanoseconds since the Unix epoch.
    pub timestamp: u64,
    pub devices: Vec<DeviceLayout>,
    pub not_placed: Vec<NotPlacedRecord>,
    pub regions: Vec<LogicalRegion>,
}

impl Layout {
    pub fn device(&self, id: &str) -> Option<&DeviceLayout> {
        self.devices.iter().find(|d| d.device_id == id)
    }

    pub fn device_mut(&mut self, id: &str) -> Option<&mut DeviceLayout> {
        self.devices.iter_mut().find(|d| d.device_id == id)
    }

    pub fn component_on_device(&self, device: &str, component: &str) -> Option<&PlacedComponent> {
        self.device(device)?
            .components
            .iter()
            .find(|c| c.component_id == component)
    }

    /// Devices hosting the given component.
    pub fn devices_for(&self, component: &str) -> Vec<&DeviceId> {
        self.devices
            .iter()
            .filter(|d| d.components.iter().any(|c| c.component_id == component))
            .map(|d| &d.device_id)
            .collect()
    }

    pub fn not_placed_status(&self, component: &str) -> Option<PlacementStatus> {
        self.not_placed
            .iter()
            .find(|record| record.components.iter().any(|c| c == component))
            .map(|record| record.status)
    }

    pub fn placed_count(&self) -> usize {
        self.devices.iter().map(|d| d.components.len()).sum()
    }
}
