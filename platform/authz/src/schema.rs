use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::resource::ResourceExpression;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaViolation {
    #[error("system {0} is not registered")]
    UnknownSystem(String),
    #[error("resource type {resource_type} is not declared by system {system}")]
    UnknownType {
        system: String,
        resource_type: String,
    },
    #[error("{ancestor} cannot appear at this position above {resource_type} in system {system}")]
    InvalidAncestor {
        system: String,
        resource_type: String,
        ancestor: String,
    },
}

/// Resource-type schema lookups used to validate ancestor chains.
pub trait ResourceSchema: Send + Sync {
    fn check(&self, expr: &ResourceExpression) -> Result<(), SchemaViolation>;
}

/// Accepts every expression. Used when no schema document is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct PermissiveSchema;

impl ResourceSchema for PermissiveSchema {
    fn check(&self, _expr: &ResourceExpression) -> Result<(), SchemaViolation> {
        Ok(())
    }
}

/// Schema built from a JSON document of the form
/// `{"systems": {"bk_cmdb": {"host": ["biz", "set", "module"]}}}` where each
/// type lists its permitted ancestor types root-to-leaf.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StaticResourceSchema {
    systems: HashMap<String, HashMap<String, Vec<String>>>,
}

impl StaticResourceSchema {
    pub fn from_json(document: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(document)
    }

    #[must_use]
    pub fn with_type(
        mut self,
        system: impl Into<String>,
        resource_type: impl Into<String>,
        ancestors: &[&str],
    ) -> Self {
        self.systems
            .entry(system.into())
            .or_default()
            .insert(
                resource_type.into(),
                ancestors.iter().map(|s| (*s).to_string()).collect(),
            );
        self
    }
}

impl ResourceSchema for StaticResourceSchema {
    fn check(&self, expr: &ResourceExpression) -> Result<(), SchemaViolation> {
        let types = self
            .systems
            .get(&expr.system)
            .ok_or_else(|| SchemaViolation::UnknownSystem(expr.system.clone()))?;
        let declared = types
            .get(&expr.kind)
            .ok_or_else(|| SchemaViolation::UnknownType {
                system: expr.system.clone(),
                resource_type: expr.kind.clone(),
            })?;

        // Ancestors must be a subsequence of the declared chain.
        let mut cursor = 0;
        for node in &expr.ancestors {
            match declared[cursor..].iter().position(|t| *t == node.kind) {
                Some(offset) => cursor += offset + 1,
                None => {
                    return Err(SchemaViolation::InvalidAncestor {
                        system: expr.system.clone(),
                        resource_type: expr.kind.clone(),
                        ancestor: node.kind.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
