use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    policy::{PolicyDraft, StoredPolicy},
    resource::{ExpiredAt, ResourceExpression, Subject},
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("policy store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("stored policy {policy_id} is corrupt: {reason}")]
    Corrupt { policy_id: Uuid, reason: String },
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Durable grant/revoke primitives.
///
/// `grant` merges the draft's expressions into any existing policy for the
/// same subject, system and action and refreshes its expiry. `revoke` removes
/// the draft's expressions; expressions that are not covered are ignored.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn grant(
        &self,
        subject: &Subject,
        draft: &PolicyDraft,
    ) -> Result<StoredPolicy, StoreError>;

    async fn revoke(
        &self,
        subject: &Subject,
        draft: &PolicyDraft,
    ) -> Result<StoredPolicy, StoreError>;
}

type PolicyKey = (Subject, String, String);

#[derive(Clone, Debug)]
struct MemoryPolicy {
    id: Uuid,
    resources: Vec<ResourceExpression>,
    expired_at: ExpiredAt,
}

/// In-process policy store keyed by `(subject, system, action)`.
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    policies: Mutex<HashMap<PolicyKey, MemoryPolicy>>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resource expressions currently granted, if any.
    pub async fn granted(
        &self,
        subject: &Subject,
        system: &str,
        action_id: &str,
    ) -> Option<Vec<ResourceExpression>> {
        let policies = self.policies.lock().await;
        policies
            .get(&key(subject, system, action_id))
            .map(|p| p.resources.clone())
    }

    pub async fn len(&self) -> usize {
        self.policies.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.policies.lock().await.is_empty()
    }
}

fn key(subject: &Subject, system: &str, action_id: &str) -> PolicyKey {
    (subject.clone(), system.to_string(), action_id.to_string())
}

fn stored(
    id: Option<Uuid>,
    subject: &Subject,
    draft: &PolicyDraft,
    expired_at: ExpiredAt,
) -> StoredPolicy {
    StoredPolicy {
        policy_id: id,
        action_id: draft.action_id.clone(),
        subject: subject.clone(),
        expired_at,
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn grant(
        &self,
        subject: &Subject,
        draft: &PolicyDraft,
    ) -> Result<StoredPolicy, StoreError> {
        let mut policies = self.policies.lock().await;
        let policy = policies
            .entry(key(subject, &draft.system, &draft.action_id))
            .or_insert_with(|| MemoryPolicy {
                id: Uuid::new_v4(),
                resources: Vec::new(),
                expired_at: draft.expired_at,
            });
        for expr in &draft.resource_expressions {
            if !policy.resources.contains(expr) {
                policy.resources.push(expr.clone());
            }
        }
        policy.expired_at = draft.expired_at;
        Ok(stored(Some(policy.id), subject, draft, policy.expired_at))
    }

    async fn revoke(
        &self,
        subject: &Subject,
        draft: &PolicyDraft,
    ) -> Result<StoredPolicy, StoreError> {
        let mut policies = self.policies.lock().await;
        let key = key(subject, &draft.system, &draft.action_id);
        let Some(policy) = policies.get_mut(&key) else {
            return Ok(stored(None, subject, draft, draft.expired_at));
        };
        policy
            .resources
            .retain(|expr| !draft.resource_expressions.contains(expr));
        let result = stored(Some(policy.id), subject, draft, policy.expired_at);
        if policy.resources.is_empty() {
            policies.remove(&key);
        }
        Ok(result)
    }
}
