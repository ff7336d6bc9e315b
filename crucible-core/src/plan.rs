//! Plan objects: the per-plan slice the core owns
//!
//! A plan groups tests and carries context overrides plus the raw hardware
//! requirement document. The constraint syntax is owned by the hardware
//! crate; provisioning itself happens elsewhere.

use crate::context::Context;
use crate::error::SchemaError;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

/// A materialized plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub name: String,
    pub environment: BTreeMap<String, String>,
    /// Context dimensions the plan pins for its tests.
    pub context: Context,
    /// Raw hardware requirement document, parsed on demand by the
    /// hardware constraint crate.
    pub hardware: Option<Value>,
    /// Unknown top-level keys, preserved losslessly.
    pub extra: Mapping,
}

impl Plan {
    pub fn new(name: impl Into<String>) -> Result<Self, SchemaError> {
        let name = name.into();
        if !name.starts_with('/') {
            return Err(SchemaError::InvalidName {
                name,
                reason: "plan names must start with '/'".to_string(),
            });
        }
        Ok(Self {
            name,
            ..Self::default()
        })
    }
}
