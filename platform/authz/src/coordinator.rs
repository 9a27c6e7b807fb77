use crate::{
    AuthzError,
    policy::{Operation, PolicyDraft, StoredPolicy},
    resource::Subject,
    store::PolicyStore,
};

/// Applies drafts against a [`PolicyStore`] one at a time, in order.
///
/// The loop stops at the first store failure; a returned list always covers
/// every draft. Calls are never issued concurrently because the store's
/// merge-on-grant must observe writes in the requested action order.
#[derive(Clone, Copy, Debug, Default)]
pub struct GrantRevokeCoordinator;

impl GrantRevokeCoordinator {
    pub fn new() -> Self {
        Self
    }

    pub async fn apply<S>(
        &self,
        operation: Operation,
        subject: &Subject,
        drafts: &[PolicyDraft],
        store: &S,
    ) -> Result<Vec<StoredPolicy>, AuthzError>
    where
        S: PolicyStore + ?Sized,
    {
        let mut applied = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let result = match operation {
                Operation::Grant => store.grant(subject, draft).await,
                Operation::Revoke => store.revoke(subject, draft).await,
            };
            let policy = result.map_err(|source| AuthzError::Store {
                action_id: draft.action_id.clone(),
                source,
            })?;
            if policy.action_id != draft.action_id {
                return Err(AuthzError::OutOfOrder {
                    requested: draft.action_id.clone(),
                    returned: policy.action_id,
                });
            }
            applied.push(policy);
        }
        Ok(applied)
    }
}
