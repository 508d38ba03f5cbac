//! Data model orchestrator following the RSB module specification.
//!
//! Snapshot types consumed by the engine (context, devices, components) and
//! the persist-ready layout types it produces live in the private `core`
//! module.

mod core;

pub use core::{
    Component, ComponentId, ComponentSet, ComponentState, Context, ContextConfig, CoordValue,
    Device, DeviceCapabilities, DeviceId, DeviceLayout, Group, GroupId, GroupKind, Layout,
    LogicalRegion, NotPlacedRecord, Orientation, PlacedComponent, PlacementStatus, PositionValue,
    PriorityOverrides, RegionDef, RegionId, SizeValue,
};
