use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::resource::{ExpiredAt, ResourceExpression, Subject};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Grant,
    Revoke,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Grant => "grant",
            Operation::Revoke => "revoke",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "grant" => Some(Operation::Grant),
            "revoke" => Some(Operation::Revoke),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A not-yet-applied grant/revoke unit for one action.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PolicyDraft {
    pub system: String,
    pub action_id: String,
    pub resource_expressions: Vec<ResourceExpression>,
    pub expired_at: ExpiredAt,
}

impl PolicyDraft {
    /// Builds a draft, dropping exact duplicate expressions while keeping the
    /// first occurrence order.
    pub fn new(
        system: impl Into<String>,
        action_id: impl Into<String>,
        resources: &[ResourceExpression],
        expired_at: ExpiredAt,
    ) -> Self {
        let mut resource_expressions: Vec<ResourceExpression> = Vec::with_capacity(resources.len());
        for expr in resources {
            if !resource_expressions.contains(expr) {
                resource_expressions.push(expr.clone());
            }
        }
        Self {
            system: system.into(),
            action_id: action_id.into(),
            resource_expressions,
            expired_at,
        }
    }
}

/// The durable record a policy store returns after a grant or revoke.
///
/// `policy_id` is `None` when a revoke found nothing to remove.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoredPolicy {
    pub policy_id: Option<Uuid>,
    pub action_id: String,
    pub subject: Subject,
    pub expired_at: ExpiredAt,
}
