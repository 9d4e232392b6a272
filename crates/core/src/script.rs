//! JSON edit scripts for headless use
//!
//! ```json
//! { "annotations": [ ... ], "rotations": { "0": 90 } }
//! ```

use crate::annotation::{Annotation, AnnotationStore};
use crate::error::{EditorError, EditorResult};
use pagemark_engine::Rotation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditScript {
    pub annotations: Vec<Annotation>,
    /// Page index to clockwise degrees
    pub rotations: BTreeMap<u32, i64>,
}

impl EditScript {
    pub fn from_json(json: &str) -> EditorResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> EditorResult<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> EditorResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Capture the edits of a session
    pub fn from_state(store: &AnnotationStore, rotations: &BTreeMap<u32, Rotation>) -> Self {
        Self {
            annotations: store.iter().cloned().collect(),
            rotations: rotations
                .iter()
                .map(|(page, rotation)| (*page, i64::from(rotation.degrees())))
                .collect(),
        }
    }

    /// Rotations validated as quarter turns
    pub fn page_rotations(&self) -> EditorResult<BTreeMap<u32, Rotation>> {
        self.rotations
            .iter()
            .map(|(page, degrees)| {
                Rotation::from_degrees(*degrees)
                    .map(|rotation| (*page, rotation))
                    .ok_or(EditorError::InvalidRotation(*degrees))
            })
            .collect()
    }
}
