use std::collections::HashSet;

use crate::error::{EngineError, Result};
use crate::geometry::{Size, EPSILON};
use crate::model::{Component, Device};

use super::document::{Anchor, ConstraintConfig, MarginSpec, SizeSpec, Unit};

/// Per-component constraint materialised against one concrete device.
///
/// Size specs keep their declared units; conversion to pixels happens per
/// host region because percent units resolve against the region's bounding
/// size, which is not known until the packer tries a node.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConstraint {
    pub priority: i32,
    pub min_size: SizeSpec,
    pub pref_size: SizeSpec,
    /// Height over width; 0.0 means the aspect is free.
    pub aspect: f64,
    /// Margin in pixels, dpi conversion already applied.
    pub margin: f64,
    pub target_regions: Option<HashSet<String>>,
    pub anchors: Vec<Anchor>,
    pub audio: bool,
    pub video: bool,
    pub touch: bool,
    pub dependencies: Vec<String>,
    pub device_dependency: bool,
    dpi: f64,
}

impl EffectiveConstraint {
    /// Minimum size in pixels against the given bounding size.
    pub fn min_size_px(&self, bounding: Size) -> Size {
        Size::new(
            resolve_dim(self.min_size.width, self.min_size.unit, bounding.width, self.dpi).max(1.0),
            resolve_dim(
                self.min_size.height,
                self.min_size.unit,
                bounding.height,
                self.dpi,
            )
            .max(1.0),
        )
    }

    /// Preferred width in pixels, `None` when the axis is "don't care".
    pub fn pref_width_px(&self, bounding: Size) -> Option<f64> {
        if self.pref_size.width < 0.0 {
            return None;
        }
        Some(resolve_dim(
            self.pref_size.width,
            self.pref_size.unit,
            bounding.width,
            self.dpi,
        ))
    }

    /// Preferred height in pixels, `None` when the axis is "don't care".
    pub fn pref_height_px(&self, bounding: Size) -> Option<f64> {
        if self.pref_size.height < 0.0 {
            return None;
        }
        Some(resolve_dim(
            self.pref_size.height,
            self.pref_size.unit,
            bounding.height,
            self.dpi,
        ))
    }

    /// Preferred pixel area with don't-care axes falling back to minimums.
    pub fn pref_area_px(&self, bounding: Size) -> f64 {
        let min = self.min_size_px(bounding);
        let width = self.pref_width_px(bounding).unwrap_or(min.width);
        let height = self.pref_height_px(bounding).unwrap_or(min.height);
        width * height
    }

    /// Deferred min/pref validation: when the two sizes declare different
    /// units, the resolver cannot compare them up front because percent and
    /// inches only resolve against a concrete bounding size. The packer
    /// calls this per region and treats a violation as impossible geometry.
    pub fn min_exceeds_pref(&self, bounding: Size) -> bool {
        let min = self.min_size_px(bounding);
        if let Some(pref) = self.pref_width_px(bounding) {
            if min.width > pref + EPSILON {
                return true;
            }
        }
        if let Some(pref) = self.pref_height_px(bounding) {
            if min.height > pref + EPSILON {
                return true;
            }
        }
        false
    }

    pub fn region_allowed(&self, region: &str) -> bool {
        match &self.target_regions {
            Some(whitelist) => whitelist.contains(region),
            None => true,
        }
    }

    pub fn is_anchored(&self) -> bool {
        !self.anchors.is_empty()
    }

    /// Ordering rank of the strongest anchor: top, right, left, bottom win in
    /// that order, centre anchors come after the edges.
    pub fn anchor_rank(&self) -> u8 {
        self.anchors
            .iter()
            .map(|anchor| match anchor {
                Anchor::Top => 0,
                Anchor::Right => 1,
                Anchor::Left => 2,
                Anchor::Bottom => 3,
                Anchor::VCenter => 4,
                Anchor::HCenter => 5,
            })
            .min()
            .unwrap_or(u8::MAX)
    }
}

fn resolve_dim(value: f64, unit: Unit, bound: f64, dpi: f64) -> f64 {
    match unit {
        Unit::Px => value,
        Unit::Percent => bound * value / 100.0,
        Unit::Inches => value * dpi,
    }
}

/// Parse an aspect string "w:h" of positive integers into the height-over-
/// width ratio.
fn parse_aspect(raw: &str) -> std::result::Result<f64, String> {
    let mut parts = raw.split(':');
    let (Some(w), Some(h), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("aspect `{raw}` is not of the form w:h"));
    };
    let width: u32 = w
        .trim()
        .parse()
        .map_err(|_| format!("aspect width `{w}` is not a positive integer"))?;
    let height: u32 = h
        .trim()
        .parse()
        .map_err(|_| format!("aspect height `{h}` is not a positive integer"))?;
    if width == 0 || height == 0 {
        return Err(format!("aspect `{raw}` must use positive integers"));
    }
    Ok(f64::from(height) / f64::from(width))
}

fn resolve_margin(margin: Option<&MarginSpec>, dpi: f64) -> std::result::Result<f64, String> {
    match margin {
        None => Ok(0.0),
        Some(spec) => match spec.unit {
            Unit::Px => Ok(spec.size),
            Unit::Inches => Ok(spec.size * dpi),
            Unit::Percent => Err("margin unit `percent` is not supported".to_string()),
        },
    }
}

/// Materialise the effective constraint for one component on one device.
///
/// The scalar priority is the first match in the order device override,
/// group override, context override, constraint default; the override value
/// −1 removes an override at its scope.
pub fn resolve(
    component: &Component,
    config: &ConstraintConfig,
    device: &Device,
) -> Result<EffectiveConstraint> {
    let invalid = |reason: String| EngineError::InvalidConstraint {
        constraint_id: component
            .constraint_id
            .clone()
            .unwrap_or_else(|| "default".to_string()),
        reason,
    };

    let dpi = device.capabilities.dpi;
    let priority = component
        .priorities
        .resolve(&device.id, &device.group)
        .unwrap_or(config.priority);
    if priority < 0 {
        return Err(invalid(format!("priority {priority} is negative")));
    }

    let min_size = config.min_size.unwrap_or_else(SizeSpec::one_px);
    let pref_size = component
        .pref_size
        .or(config.pref_size)
        .unwrap_or_else(SizeSpec::dont_care);

    // Same-unit min/pref conflicts are rejected here; mixed units cannot be
    // compared until a bounding size is known, so those go through
    // `EffectiveConstraint::min_exceeds_pref` at packing time instead.
    if min_size.unit == pref_size.unit {
        for (min, pref, axis) in [
            (min_size.width, pref_size.width, "width"),
            (min_size.height, pref_size.height, "height"),
        ] {
            if pref >= 0.0 && min > pref {
                return Err(invalid(format!(
                    "minimum {axis} {min} exceeds preferred {axis} {pref}"
                )));
            }
        }
    }

    let aspect = match config.aspect.as_deref() {
        None => 0.0,
        Some(raw) => parse_aspect(raw).map_err(&invalid)?,
    };
    let margin = resolve_margin(config.margin.as_ref(), dpi).map_err(&invalid)?;

    Ok(EffectiveConstraint {
        priority,
        min_size,
        pref_size,
        aspect,
        margin,
        target_regions: config
            .target_regions
            .as_ref()
            .map(|regions| regions.iter().cloned().collect()),
        anchors: config.anchor.clone(),
        audio: config.audio,
        video: config.video,
        touch: config.touch_interaction,
        dependencies: config.component_dependency.clone(),
        device_dependency: config.component_device_dependency,
        dpi,
    })
}
