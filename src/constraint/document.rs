use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};

/// Constraint document version the engine understands.
pub const SUPPORTED_VERSION: u32 = 4;

/// Reserved constraint id applied to components with a missing or unknown
/// binding.
pub const DEFAULT_CONSTRAINT_ID: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[default]
    Px,
    Percent,
    Inches,
}

/// Width/height pair with a measurement unit.
///
/// The sentinel value −1 on either axis of a preferred size means "don't
/// care" for that dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeSpec {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub unit: Unit,
}

impl SizeSpec {
    pub const fn px(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            unit: Unit::Px,
        }
    }

    /// Default preferred size: no preference on either axis.
    pub const fn dont_care() -> Self {
        Self::px(-1.0, -1.0)
    }

    /// Default minimum size: one pixel per axis.
    pub const fn one_px() -> Self {
        Self::px(1.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginSpec {
    pub size: f64,
    #[serde(default)]
    pub unit: Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    Top,
    Bottom,
    Left,
    Right,
    VCenter,
    HCenter,
}

/// One side (personal or communal) of a constraint record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintConfig {
    #[serde(default)]
    pub aspect: Option<String>,
    #[serde(default)]
    pub pref_size: Option<SizeSpec>,
    #[serde(default)]
    pub min_size: Option<SizeSpec>,
    #[serde(default)]
    pub target_regions: Option<Vec<String>>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub audio: bool,
    #[serde(default)]
    pub video: bool,
    #[serde(default)]
    pub touch_interaction: bool,
    #[serde(default)]
    pub margin: Option<MarginSpec>,
    #[serde(default)]
    pub anchor: Vec<Anchor>,
    #[serde(default)]
    pub component_dependency: Vec<String>,
    #[serde(default)]
    pub component_device_dependency: bool,
}

fn default_priority() -> i32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintRecord {
    pub constraint_id: String,
    #[serde(default)]
    pub personal: Option<ConstraintConfig>,
    #[serde(default)]
    pub communal: Option<ConstraintConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutModel {
    Dynamic,
    Packer,
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintDocument {
    pub version: u32,
    pub dmapp: String,
    pub constraints: Vec<ConstraintRecord>,
    pub layout_model: LayoutModel,
    #[serde(default)]
    pub templates: Option<Value>,
}

impl ConstraintDocument {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Validated constraint lookup table for one DMApp.
#[derive(Debug, Clone)]
pub struct ConstraintSet {
    dmapp: String,
    records: Vec<ConstraintRecord>,
    index: HashMap<String, usize>,
    default_index: usize,
}

impl ConstraintSet {
    pub fn from_document(doc: ConstraintDocument) -> Result<Self> {
        if doc.version != SUPPORTED_VERSION {
            return Err(EngineError::UnsupportedDocumentVersion(doc.version));
        }
        if doc.layout_model == LayoutModel::Template {
            return Err(EngineError::UnsupportedLayoutModel("template".to_string()));
        }

        let mut index = HashMap::new();
        for (pos, record) in doc.constraints.iter().enumerate() {
            index.insert(record.constraint_id.clone(), pos);
        }
        let default_index = *index
            .get(DEFAULT_CONSTRAINT_ID)
            .ok_or(EngineError::MissingDefaultConstraint)?;

        Ok(Self {
            dmapp: doc.dmapp,
            records: doc.constraints,
            index,
            default_index,
        })
    }

    pub fn dmapp(&self) -> &str {
        &self.dmapp
    }

    /// Record for the given binding; missing or unknown bindings resolve to
    /// the `default` record.
    pub fn lookup(&self, constraint_id: Option<&str>) -> &ConstraintRecord {
        let pos = constraint_id
            .and_then(|id| self.index.get(id).copied())
            .unwrap_or(self.default_index);
        &self.records[pos]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> ConstraintDocument {
        ConstraintDocument::from_json(
            r#"{
                "version": 4,
                "dmapp": "demo",
                "layoutModel": "dynamic",
                "constraints": [
                    {
                        "constraintId": "default",
                        "communal": { "priority": 1 },
                        "personal": { "priority": 1 }
                    },
                    {
                        "constraintId": "video",
                        "communal": {
                            "aspect": "16:9",
                            "prefSize": { "width": 1920, "height": 810 },
                            "minSize": { "width": 800, "height": 450 },
                            "priority": 300,
                            "audio": true,
                            "video": true,
                            "anchor": ["top"]
                        }
                    }
                ]
            }"#,
        )
        .expect("document parses")
    }

    #[test]
    fn parses_camel_case_fields() {
        let doc = sample_document();
        assert_eq!(doc.layout_model, LayoutModel::Dynamic);
        let video = &doc.constraints[1];
        let communal = video.communal.as_ref().unwrap();
        assert_eq!(communal.priority, 300);
        assert_eq!(communal.anchor, vec![Anchor::Top]);
        assert_eq!(communal.aspect.as_deref(), Some("16:9"));
        assert_eq!(communal.min_size.unwrap().unit, Unit::Px);
    }

    #[test]
    fn lookup_falls_back_to_default() {
        let set = ConstraintSet::from_document(sample_document()).unwrap();
        assert_eq!(set.lookup(Some("video")).constraint_id, "video");
        assert_eq!(set.lookup(Some("missing")).constraint_id, "default");
        assert_eq!(set.lookup(None).constraint_id, "default");
    }

    #[test]
    fn rejects_template_model() {
        let mut doc = sample_document();
        doc.layout_model = LayoutModel::Template;
        let err = ConstraintSet::from_document(doc).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedLayoutModel(_)));
    }

    #[test]
    fn rejects_missing_default() {
        let mut doc = sample_document();
        doc.constraints.remove(0);
        let err = ConstraintSet::from_document(doc).unwrap_err();
        assert!(matches!(err, EngineError::MissingDefaultConstraint));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut doc = sample_document();
        doc.version = 3;
        let err = ConstraintSet::from_document(doc).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedDocumentVersion(3)));
    }
}
