use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{
    ComponentId, DeviceId, LogicalRegion, PositionValue, PriorityOverrides, RegionId, SizeValue,
};

/// Process-wide message-id counter; ids are unique and monotonic within one
/// evaluation. This is the engine's only process-wide mutable state.
static MESSAGE_IDS: AtomicU64 = AtomicU64::new(1);

pub fn next_message_id() -> u64 {
    MESSAGE_IDS.fetch_add(1, Ordering::Relaxed)
}

/// Create timestamps lead updates by this much so clients can pre-load.
pub const CREATE_LEAD_NS: u64 = 100_000_000;

/// Layout fragment embedded in create/update messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageLayout {
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<SizeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_depth: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_id: Option<RegionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
}

impl MessageLayout {
    /// Fresh-init form: only the instance id, geometry follows later.
    pub fn instance_only(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            position: None,
            size: None,
            z_depth: None,
            region_id: None,
            device_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessage {
    pub message_id: u64,
    /// Nanoseconds since the Unix epoch, offset −100 ms from updates.
    pub timestamp: u64,
    pub component_id: ComponentId,
    pub context_id: String,
    #[serde(rename = "DMAppId")]
    pub dmapp_id: String,
    pub device_id: DeviceId,
    pub config: Value,
    pub start_time: Option<f64>,
    pub stop_time: Option<f64>,
    pub layout: MessageLayout,
    pub parameters: Value,
    pub priorities: PriorityOverrides,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    pub message_id: u64,
    pub timestamp: u64,
    pub component_id: ComponentId,
    pub context_id: String,
    #[serde(rename = "DMAppId")]
    pub dmapp_id: String,
    pub device_id: DeviceId,
    pub start_time: Option<f64>,
    pub stop_time: Option<f64>,
    pub layout: MessageLayout,
    pub parameters: Value,
    pub priorities: PriorityOverrides,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyMessage {
    pub message_id: u64,
    pub timestamp: u64,
    pub component_id: ComponentId,
    pub context_id: String,
    #[serde(rename = "DMAppId")]
    pub dmapp_id: String,
    pub device_id: DeviceId,
    pub stop_time: Option<f64>,
    pub instance_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentPropertiesEntry {
    pub component_id: ComponentId,
    #[serde(rename = "DMAppId")]
    pub dmapp_id: String,
    pub context_id: String,
    pub device_id: DeviceId,
    pub priorities: PriorityOverrides,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentPropertiesMessage {
    pub message_id: u64,
    pub timestamp: u64,
    pub components: Vec<ComponentPropertiesEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalRegionChangeMessage {
    pub message_id: u64,
    pub timestamp: u64,
    pub logical_regions: Vec<LogicalRegion>,
}
