//! Grant and revoke endpoints, mounted under both the open and the internal
//! API prefixes.

use anyhow::{Context, anyhow};
use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;
use platform_api::{ApiResult, CodeError, ErrorCode, Failure, Locale, RequestContext};
use platform_authz::{AuthzError, PolicyDraft, StoredPolicy};
use platform_db::SeaOrmPolicyStore;
use platform_obs::{AuditRecord, AuditedPolicy, OpsEvent};
use sea_orm::TransactionTrait;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use crate::{
    config::AppPermissions,
    http::{AppState, CallerApp, Ctx, JsonBody, method_not_allowed},
    requests::{Endpoint, GRANT_SCHEMA, GrantRequest, parse_grant},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/instance/", post(instance))
        .route("/path/", post(path))
        .route("/batch_instance/", post(batch_instance))
        .route("/batch_path/", post(batch_path))
        .method_not_allowed_fallback(method_not_allowed)
}

#[derive(Debug, Serialize)]
pub struct PolicyReply {
    pub policy_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ActionRef {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct ActionPolicyReply {
    pub action: ActionRef,
    pub policy_id: Option<Uuid>,
}

async fn instance(
    State(state): State<AppState>,
    caller: CallerApp,
    Ctx(ctx): Ctx,
    JsonBody(body): JsonBody,
) -> ApiResult<Json<PolicyReply>> {
    let applied = apply(&state, &caller, &ctx, &body, Endpoint::Instance).await?;
    single(applied)
}

async fn path(
    State(state): State<AppState>,
    caller: CallerApp,
    Ctx(ctx): Ctx,
    JsonBody(body): JsonBody,
) -> ApiResult<Json<PolicyReply>> {
    let applied = apply(&state, &caller, &ctx, &body, Endpoint::Path).await?;
    single(applied)
}

async fn batch_instance(
    State(state): State<AppState>,
    caller: CallerApp,
    Ctx(ctx): Ctx,
    JsonBody(body): JsonBody,
) -> ApiResult<Json<Vec<ActionPolicyReply>>> {
    let applied = apply(&state, &caller, &ctx, &body, Endpoint::BatchInstance).await?;
    Ok(Json(batch(applied)))
}

async fn batch_path(
    State(state): State<AppState>,
    caller: CallerApp,
    Ctx(ctx): Ctx,
    JsonBody(body): JsonBody,
) -> ApiResult<Json<Vec<ActionPolicyReply>>> {
    let applied = apply(&state, &caller, &ctx, &body, Endpoint::BatchPath).await?;
    Ok(Json(batch(applied)))
}

fn single(applied: Vec<StoredPolicy>) -> ApiResult<Json<PolicyReply>> {
    let policy = applied
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("coordinator returned no policy for a single action"))?;
    Ok(Json(PolicyReply {
        policy_id: policy.policy_id,
    }))
}

fn batch(applied: Vec<StoredPolicy>) -> Vec<ActionPolicyReply> {
    applied
        .into_iter()
        .map(|policy| ActionPolicyReply {
            action: ActionRef {
                id: policy.action_id,
            },
            policy_id: policy.policy_id,
        })
        .collect()
}

/// Validates, translates and applies one request inside a single database
/// transaction, committed only when every action succeeded.
async fn apply(
    state: &AppState,
    caller: &CallerApp,
    ctx: &RequestContext,
    body: &Value,
    endpoint: Endpoint,
) -> ApiResult<Vec<StoredPolicy>> {
    let request = parse_grant(body, endpoint, ctx.locale, Utc::now().timestamp())
        .map_err(|detail| Failure::validation(detail, &GRANT_SCHEMA))?;
    authorize(&state.config.app_permissions, caller, endpoint, &request)?;
    let drafts =
        translate(state, &request, endpoint).map_err(|err| authz_failure(err, ctx.locale))?;

    let txn = state
        .db
        .begin()
        .await
        .context("failed to open policy transaction")?;
    let store = SeaOrmPolicyStore::new(&txn);
    let applied = state
        .coordinator
        .apply(request.operate, &request.subject, &drafts, &store)
        .await
        .map_err(|err| authz_failure(err, ctx.locale))?;
    txn.commit()
        .await
        .context("failed to commit policy transaction")?;

    info!(
        app_code = %caller.0,
        operate = %request.operate,
        subject = %request.subject,
        system = %request.system,
        actions = applied.len(),
        "policies applied"
    );
    state.events.emit(OpsEvent::Audit(AuditRecord {
        request_id: ctx.request_id.clone(),
        app_code: caller.0.clone(),
        operate: request.operate.to_string(),
        subject: request.subject.to_string(),
        system: request.system.clone(),
        policies: applied
            .iter()
            .map(|policy| AuditedPolicy {
                action_id: policy.action_id.clone(),
                policy_id: policy.policy_id,
            })
            .collect(),
    }));
    Ok(applied)
}

/// Instance endpoints check each named action; path endpoints need the
/// whole system.
fn authorize(
    permissions: &AppPermissions,
    caller: &CallerApp,
    endpoint: Endpoint,
    request: &GrantRequest,
) -> Result<(), Failure> {
    let (app, system) = (caller.0.as_str(), request.system.as_str());
    let denied = match endpoint {
        Endpoint::Path | Endpoint::BatchPath => (!permissions.allows_system(app, system))
            .then(|| format!("app {app} may not manage system {system}")),
        Endpoint::Instance | Endpoint::BatchInstance => request
            .action_ids
            .iter()
            .find(|action_id| !permissions.allows_action(app, system, action_id))
            .map(|action_id| format!("app {app} may not manage {system}/{action_id}")),
    };
    match denied {
        Some(detail) => Err(Failure::Forbidden(detail)),
        None => Ok(()),
    }
}

fn translate(
    state: &AppState,
    request: &GrantRequest,
    endpoint: Endpoint,
) -> Result<Vec<PolicyDraft>, AuthzError> {
    let translator = &state.translator;
    let (system, resources, expired_at) = (&request.system, &request.resources, request.expired_at);
    match (endpoint, request.action_ids.as_slice()) {
        (Endpoint::Instance, [action_id]) => {
            translator.for_instance(system, action_id, resources, expired_at)
        }
        (Endpoint::Path, [action_id]) => {
            translator.for_path(system, action_id, resources, expired_at)
        }
        (Endpoint::Path | Endpoint::BatchPath, action_ids) => {
            translator.for_paths(system, action_ids, resources, expired_at)
        }
        (Endpoint::Instance | Endpoint::BatchInstance, action_ids) => {
            translator.for_instances(system, action_ids, resources, expired_at)
        }
    }
}

fn authz_failure(err: AuthzError, locale: Locale) -> Failure {
    match &err {
        AuthzError::InvalidResourceKind {
            system,
            resource_type,
            ..
        } => {
            let data = json!({"system": system, "type": resource_type});
            Failure::Domain(
                CodeError::new(ErrorCode::InvalidResourceKind, locale)
                    .format(&err, false)
                    .with_data(data),
            )
        }
        AuthzError::UnknownSystem(_) => {
            Failure::Domain(CodeError::new(ErrorCode::NotFound, locale).format(&err, false))
        }
        AuthzError::Store { .. } | AuthzError::OutOfOrder { .. } => Failure::unexpected(err),
    }
}
