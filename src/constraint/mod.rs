//! Constraint module orchestrator following the RSB module specification.
//!
//! `document` holds the serde shape of the constraint document; `resolve`
//! materialises per-component effective constraints against a concrete
//! device.

mod document;
mod resolve;

pub use document::{
    Anchor, ConstraintConfig, ConstraintDocument, ConstraintRecord, ConstraintSet, LayoutModel,
    MarginSpec, SizeSpec, Unit,
};
pub use resolve::{resolve, EffectiveConstraint};
