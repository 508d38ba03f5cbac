//! Mosaic lays out interactive media components across the display devices of
//! a shared session.
//!
//! The crate is a synchronous, pure layout core: callers hand it a context
//! snapshot (devices, groups, config), a constraint document, the component
//! set and the previously persisted layout, and receive the new layout plus
//! the differential messages that carry clients from one to the other.
//! Persistence, transport and the transaction surface live outside.

pub mod constraint;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod packer;
pub mod region;

pub use constraint::{
    Anchor, ConstraintConfig, ConstraintDocument, ConstraintRecord, ConstraintSet,
    EffectiveConstraint, SizeSpec, Unit,
};
pub use engine::{Engine, EngineConfig, Evaluation, EvaluationInput, Simulation};
pub use error::{EngineError, Result};
pub use geometry::{Point, Rect, Size};
pub use layout::{
    CoordValue, CreateMessage, DestroyMessage, Diff, LogicalRegionChangeMessage, UpdateMessage,
};
pub use logging::{LogEvent, LogFields, LogLevel, Logger, LoggingError, LoggingResult};
pub use metrics::{EngineMetrics, MetricSnapshot};
pub use model::{
    Component, ComponentId, ComponentSet, ComponentState, Context, ContextConfig, Device,
    DeviceId, Group, GroupKind, Layout, PlacementStatus, PriorityOverrides, RegionDef, RegionId,
};
