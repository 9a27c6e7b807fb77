use async_trait::async_trait;
use chrono::Utc;
use entity::policies;
use platform_authz::{
    ExpiredAt, PolicyDraft, PolicyStore, ResourceExpression, StoreError, StoredPolicy, Subject,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect,
    Select, Set, TryInsertResult, prelude::DateTimeWithTimeZone, sea_query::OnConflict,
};
use tracing::debug;
use uuid::Uuid;

/// [`PolicyStore`] over the `policies` table.
///
/// Borrows any sea-orm connection; pass a `DatabaseTransaction` to make a
/// whole batch atomic. Rows are read `FOR UPDATE` so concurrent writers on
/// the same subject, system and action queue behind each other.
pub struct SeaOrmPolicyStore<'a, C> {
    conn: &'a C,
}

/// Row lookup for one subject, system and action, locked for update.
fn locked(subject: &Subject, draft: &PolicyDraft) -> Select<policies::Entity> {
    policies::Entity::find()
        .filter(policies::Column::SubjectType.eq(subject.kind.as_str()))
        .filter(policies::Column::SubjectId.eq(subject.id.as_str()))
        .filter(policies::Column::System.eq(draft.system.as_str()))
        .filter(policies::Column::ActionId.eq(draft.action_id.as_str()))
        .lock_exclusive()
}

fn unique_key() -> OnConflict {
    OnConflict::columns([
        policies::Column::SubjectType,
        policies::Column::SubjectId,
        policies::Column::System,
        policies::Column::ActionId,
    ])
    .do_nothing()
    .to_owned()
}

impl<'a, C: ConnectionTrait> SeaOrmPolicyStore<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    async fn find(
        &self,
        subject: &Subject,
        draft: &PolicyDraft,
    ) -> Result<Option<policies::Model>, StoreError> {
        locked(subject, draft)
            .one(self.conn)
            .await
            .map_err(StoreError::backend)
    }

    /// Inserts a fresh row. Returns `None` when another writer holds the
    /// unique key already.
    async fn create(
        &self,
        subject: &Subject,
        draft: &PolicyDraft,
        now: DateTimeWithTimeZone,
    ) -> Result<Option<Uuid>, StoreError> {
        let id = Uuid::new_v4();
        let model = policies::ActiveModel {
            id: Set(id),
            subject_type: Set(subject.kind.as_str().to_string()),
            subject_id: Set(subject.id.clone()),
            system: Set(draft.system.clone()),
            action_id: Set(draft.action_id.clone()),
            resources: Set(encode(&draft.resource_expressions)?),
            expired_at: Set(draft.expired_at.as_timestamp()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let inserted = policies::Entity::insert(model)
            .on_conflict(unique_key())
            .do_nothing()
            .exec(self.conn)
            .await
            .map_err(StoreError::backend)?;
        Ok(match inserted {
            TryInsertResult::Inserted(_) => Some(id),
            TryInsertResult::Conflicted | TryInsertResult::Empty => None,
        })
    }

    async fn merge(
        &self,
        existing: policies::Model,
        draft: &PolicyDraft,
        now: DateTimeWithTimeZone,
    ) -> Result<Uuid, StoreError> {
        let mut resources = decode(&existing)?;
        for expr in &draft.resource_expressions {
            if !resources.contains(expr) {
                resources.push(expr.clone());
            }
        }
        let id = existing.id;
        let mut model: policies::ActiveModel = existing.into();
        model.resources = Set(encode(&resources)?);
        model.expired_at = Set(draft.expired_at.as_timestamp());
        model.updated_at = Set(now);
        model.update(self.conn).await.map_err(StoreError::backend)?;
        Ok(id)
    }
}

fn decode(model: &policies::Model) -> Result<Vec<ResourceExpression>, StoreError> {
    serde_json::from_str(&model.resources).map_err(|err| StoreError::Corrupt {
        policy_id: model.id,
        reason: err.to_string(),
    })
}

fn encode(resources: &[ResourceExpression]) -> Result<String, StoreError> {
    serde_json::to_string(resources).map_err(StoreError::backend)
}

fn stored(
    policy_id: Option<Uuid>,
    subject: &Subject,
    draft: &PolicyDraft,
    expired_at: ExpiredAt,
) -> StoredPolicy {
    StoredPolicy {
        policy_id,
        action_id: draft.action_id.clone(),
        subject: subject.clone(),
        expired_at,
    }
}

#[async_trait]
impl<'a, C: ConnectionTrait> PolicyStore for SeaOrmPolicyStore<'a, C> {
    async fn grant(
        &self,
        subject: &Subject,
        draft: &PolicyDraft,
    ) -> Result<StoredPolicy, StoreError> {
        let now = Utc::now().fixed_offset();
        let existing = match self.find(subject, draft).await? {
            Some(existing) => existing,
            None => {
                if let Some(id) = self.create(subject, draft, now).await? {
                    debug!(
                        policy_id = %id,
                        action_id = %draft.action_id,
                        %subject,
                        "policy created"
                    );
                    return Ok(stored(Some(id), subject, draft, draft.expired_at));
                }
                // Lost the insert race; the winner's row is visible once it commits.
                self.find(subject, draft).await?.ok_or_else(|| {
                    StoreError::backend(DbErr::RecordNotFound(format!(
                        "policy for {subject} on {}/{} vanished after conflict",
                        draft.system, draft.action_id
                    )))
                })?
            }
        };

        let id = self.merge(existing, draft, now).await?;
        debug!(policy_id = %id, action_id = %draft.action_id, %subject, "policy merged");
        Ok(stored(Some(id), subject, draft, draft.expired_at))
    }

    async fn revoke(
        &self,
        subject: &Subject,
        draft: &PolicyDraft,
    ) -> Result<StoredPolicy, StoreError> {
        let Some(existing) = self.find(subject, draft).await? else {
            return Ok(stored(None, subject, draft, draft.expired_at));
        };

        let id = existing.id;
        let expired_at = ExpiredAt::from_timestamp(existing.expired_at);
        let mut resources = decode(&existing)?;
        resources.retain(|expr| !draft.resource_expressions.contains(expr));

        if resources.is_empty() {
            policies::Entity::delete_by_id(id)
                .exec(self.conn)
                .await
                .map_err(StoreError::backend)?;
            debug!(policy_id = %id, action_id = %draft.action_id, %subject, "policy removed");
        } else {
            let mut model: policies::ActiveModel = existing.into();
            model.resources = Set(encode(&resources)?);
            model.updated_at = Set(Utc::now().fixed_offset());
            model.update(self.conn).await.map_err(StoreError::backend)?;
        }
        Ok(stored(Some(id), subject, draft, expired_at))
    }
}
