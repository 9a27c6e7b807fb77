//! Authorization grant primitives: resource expressions, policy drafts and the
//! grant/revoke coordinator that applies them against a policy store.

mod coordinator;
mod policy;
mod resource;
mod schema;
mod store;
mod translate;

pub use coordinator::GrantRevokeCoordinator;
pub use policy::{Operation, PolicyDraft, StoredPolicy};
pub use resource::{ExpiredAt, PathNode, ResourceExpression, ResourceScope, Subject, SubjectType};
pub use schema::{PermissiveSchema, ResourceSchema, SchemaViolation, StaticResourceSchema};
pub use store::{MemoryPolicyStore, PolicyStore, StoreError};
pub use translate::PolicyTranslator;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("invalid resource {resource_type} in system {system}: {reason}")]
    InvalidResourceKind {
        system: String,
        resource_type: String,
        reason: String,
    },
    #[error("system {0} is not registered")]
    UnknownSystem(String),
    #[error("policy store failed on action {action_id}")]
    Store {
        action_id: String,
        #[source]
        source: StoreError,
    },
    #[error("policy store answered action {returned} for requested action {requested}")]
    OutOfOrder { requested: String, returned: String },
}

impl AuthzError {
    pub(crate) fn invalid_resource(expr: &ResourceExpression, reason: impl Into<String>) -> Self {
        Self::InvalidResourceKind {
            system: expr.system.clone(),
            resource_type: expr.kind.clone(),
            reason: reason.into(),
        }
    }
}

impl From<SchemaViolation> for AuthzError {
    fn from(value: SchemaViolation) -> Self {
        match value {
            SchemaViolation::UnknownSystem(system) => Self::UnknownSystem(system),
            SchemaViolation::UnknownType {
                system,
                resource_type,
            } => Self::InvalidResourceKind {
                system,
                resource_type,
                reason: "resource type is not declared".to_string(),
            },
            SchemaViolation::InvalidAncestor {
                system,
                resource_type,
                ancestor,
            } => Self::InvalidResourceKind {
                system,
                resource_type,
                reason: format!("{ancestor} is not a valid ancestor at this position"),
            },
        }
    }
}
