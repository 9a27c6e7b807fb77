//! Request body validation for the grant endpoints.
//!
//! Bodies arrive as raw JSON so every field problem can be reported at once,
//! keyed the way the input was shaped.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use platform_api::{FieldKind, Locale, Msg, ObjectSchema, ValidationNode};
use platform_authz::{
    ExpiredAt, Operation, PathNode, ResourceExpression, ResourceScope, Subject, SubjectType,
};
use serde_json::{Map, Value};

/// Shape of grant bodies, used to reduce validation detail to one line.
pub static GRANT_SCHEMA: Lazy<FieldKind> = Lazy::new(|| {
    let node = FieldKind::Object(ObjectSchema::new().scalar("type", None).scalar("id", None));
    let resource = ObjectSchema::new()
        .scalar("system", None)
        .scalar("type", None)
        .scalar("id", None)
        .field("ancestors", None, FieldKind::list_of(node));
    FieldKind::Object(
        ObjectSchema::new()
            .scalar("operate", None)
            .field(
                "subject",
                None,
                FieldKind::Object(ObjectSchema::new().scalar("type", None).scalar("id", None)),
            )
            .scalar("system", None)
            .field(
                "action",
                None,
                FieldKind::Object(ObjectSchema::new().scalar("id", None)),
            )
            .field(
                "actions",
                None,
                FieldKind::list_of(FieldKind::Object(ObjectSchema::new().scalar("id", None))),
            )
            .field("resources", None, FieldKind::list_of(FieldKind::Object(resource)))
            .scalar("expired_at", None),
    )
});

/// The four grant endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Instance,
    Path,
    BatchInstance,
    BatchPath,
}

impl Endpoint {
    pub fn scope(self) -> ResourceScope {
        match self {
            Endpoint::Instance | Endpoint::BatchInstance => ResourceScope::Instance,
            Endpoint::Path | Endpoint::BatchPath => ResourceScope::Path,
        }
    }

    pub fn is_batch(self) -> bool {
        matches!(self, Endpoint::BatchInstance | Endpoint::BatchPath)
    }
}

/// A validated grant or revoke request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrantRequest {
    pub operate: Operation,
    pub subject: Subject,
    pub system: String,
    pub action_ids: Vec<String>,
    pub resources: Vec<ResourceExpression>,
    pub expired_at: ExpiredAt,
}

type Field<T> = Result<T, ValidationNode>;

#[derive(Default)]
struct FieldErrors(Vec<(String, ValidationNode)>);

impl FieldErrors {
    fn take<T>(&mut self, key: &str, result: Field<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(node) => {
                self.0.push((key.to_string(), node));
                None
            }
        }
    }

    fn into_node(self) -> ValidationNode {
        ValidationNode::Keyed(self.0)
    }
}

/// Validates `body` for `endpoint`. `now` is the current Unix time, used to
/// reject expirations in the past.
pub fn parse_grant(
    body: &Value,
    endpoint: Endpoint,
    locale: Locale,
    now: i64,
) -> Field<GrantRequest> {
    let Value::Object(obj) = body else {
        return Err(ValidationNode::non_field(locale.text(Msg::NotAnObject)));
    };

    let mut errors = FieldErrors::default();
    let operate = errors.take("operate", operate(obj.get("operate"), locale));
    let subject = errors.take("subject", subject(obj.get("subject"), locale));
    let system = errors.take("system", string(obj.get("system"), locale));
    let action_ids = if endpoint.is_batch() {
        errors.take("actions", actions(obj.get("actions"), locale))
    } else {
        errors.take("action", action(obj.get("action"), locale).map(|id| vec![id]))
    };
    let resources = errors.take(
        "resources",
        resources(obj.get("resources"), endpoint.scope(), locale),
    );
    let expired_at = errors.take("expired_at", expired_at(obj.get("expired_at"), locale, now));

    let (
        Some(operate),
        Some(subject),
        Some(system),
        Some(action_ids),
        Some(resources),
        Some(expired_at),
    ) = (operate, subject, system, action_ids, resources, expired_at)
    else {
        return Err(errors.into_node());
    };
    Ok(GrantRequest {
        operate,
        subject,
        system,
        action_ids,
        resources,
        expired_at,
    })
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn required(value: Option<&Value>, locale: Locale) -> Field<&Value> {
    present(value).ok_or_else(|| ValidationNode::message(locale.text(Msg::Required)))
}

fn string(value: Option<&Value>, locale: Locale) -> Field<String> {
    match required(value, locale)? {
        Value::String(s) if s.trim().is_empty() => {
            Err(ValidationNode::message(locale.text(Msg::Required)))
        }
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(ValidationNode::message(locale.text(Msg::NotAString))),
    }
}

fn object(value: Option<&Value>, locale: Locale) -> Field<&Map<String, Value>> {
    match required(value, locale)? {
        Value::Object(map) => Ok(map),
        _ => Err(ValidationNode::non_field(locale.text(Msg::NotAnObject))),
    }
}

fn list(value: Option<&Value>, locale: Locale) -> Field<&Vec<Value>> {
    match required(value, locale)? {
        Value::Array(items) if items.is_empty() => {
            Err(ValidationNode::message(locale.text(Msg::EmptyList)))
        }
        Value::Array(items) => Ok(items),
        _ => Err(ValidationNode::message(locale.text(Msg::NotAList))),
    }
}

/// Parses each item, collecting per-index errors.
fn items<T>(values: &[Value], mut parse: impl FnMut(&Value) -> Field<T>) -> Field<Vec<T>> {
    let mut parsed = Vec::with_capacity(values.len());
    let mut failed = Vec::new();
    for (index, value) in values.iter().enumerate() {
        match parse(value) {
            Ok(item) => parsed.push(item),
            Err(node) => failed.push((index, node)),
        }
    }
    if failed.is_empty() {
        Ok(parsed)
    } else {
        Err(ValidationNode::Indexed(failed))
    }
}

fn operate(value: Option<&Value>, locale: Locale) -> Field<Operation> {
    let raw = string(value, locale)?;
    Operation::parse(&raw).ok_or_else(|| ValidationNode::message(locale.text(Msg::InvalidChoice)))
}

fn subject(value: Option<&Value>, locale: Locale) -> Field<Subject> {
    let obj = object(value, locale)?;
    let mut errors = FieldErrors::default();
    let kind = errors.take(
        "type",
        string(obj.get("type"), locale).and_then(|raw| {
            SubjectType::parse(&raw)
                .ok_or_else(|| ValidationNode::message(locale.text(Msg::InvalidChoice)))
        }),
    );
    let id = errors.take("id", string(obj.get("id"), locale));
    match (kind, id) {
        (Some(kind), Some(id)) => Ok(Subject::new(kind, id)),
        _ => Err(errors.into_node()),
    }
}

fn action(value: Option<&Value>, locale: Locale) -> Field<String> {
    let obj = object(value, locale)?;
    string(obj.get("id"), locale).map_err(|node| ValidationNode::field("id", node))
}

fn actions(value: Option<&Value>, locale: Locale) -> Field<Vec<String>> {
    let ids = items(list(value, locale)?, |item| action(Some(item), locale))?;
    let unique = {
        let mut seen = HashSet::with_capacity(ids.len());
        ids.iter().all(|id| seen.insert(id.as_str()))
    };
    if unique {
        Ok(ids)
    } else {
        Err(ValidationNode::message(locale.text(Msg::DuplicateAction)))
    }
}

fn resources(
    value: Option<&Value>,
    scope: ResourceScope,
    locale: Locale,
) -> Field<Vec<ResourceExpression>> {
    items(list(value, locale)?, |item| resource(item, scope, locale))
}

fn resource(value: &Value, scope: ResourceScope, locale: Locale) -> Field<ResourceExpression> {
    let obj = object(Some(value), locale)?;
    let mut errors = FieldErrors::default();
    let system = errors.take("system", string(obj.get("system"), locale));
    let kind = errors.take("type", string(obj.get("type"), locale));
    let id = match scope {
        ResourceScope::Instance => errors.take("id", string(obj.get("id"), locale).map(Some)),
        ResourceScope::Path => match present(obj.get("id")) {
            Some(_) => errors.take::<Option<String>>(
                "id",
                Err(ValidationNode::message(locale.text(Msg::MustBeAbsent))),
            ),
            None => Some(None),
        },
    };
    let ancestors = errors.take("ancestors", ancestors(obj.get("ancestors"), scope, locale));

    let (Some(system), Some(kind), Some(id), Some(ancestors)) = (system, kind, id, ancestors) else {
        return Err(errors.into_node());
    };
    Ok(ResourceExpression {
        system,
        kind,
        id,
        ancestors,
    })
}

fn ancestors(value: Option<&Value>, scope: ResourceScope, locale: Locale) -> Field<Vec<PathNode>> {
    let nodes = match (scope, present(value)) {
        (ResourceScope::Instance, None) => return Ok(Vec::new()),
        (ResourceScope::Instance, Some(Value::Array(nodes))) => nodes,
        _ => list(value, locale)?,
    };
    items(nodes, |item| {
        let obj = object(Some(item), locale)?;
        let mut errors = FieldErrors::default();
        let kind = errors.take("type", string(obj.get("type"), locale));
        let id = errors.take("id", string(obj.get("id"), locale));
        match (kind, id) {
            (Some(kind), Some(id)) => Ok(PathNode::new(kind, id)),
            _ => Err(errors.into_node()),
        }
    })
}

fn expired_at(value: Option<&Value>, locale: Locale, now: i64) -> Field<ExpiredAt> {
    let Some(value) = present(value) else {
        return Ok(ExpiredAt::NEVER);
    };
    let secs = value
        .as_i64()
        .filter(|secs| *secs >= 0)
        .ok_or_else(|| ValidationNode::message(locale.text(Msg::NotAnInteger)))?;
    let expired_at = ExpiredAt::from_timestamp(secs);
    if expired_at.is_valid_at(now) {
        Ok(expired_at)
    } else {
        Err(ValidationNode::message(locale.text(Msg::Expired)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_api::one_line_error;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn instance_body() -> Value {
        json!({
            "operate": "grant",
            "subject": {"type": "user", "id": "alice"},
            "system": "bk_cmdb",
            "action": {"id": "view"},
            "resources": [{"system": "bk_cmdb", "type": "host", "id": "123"}],
            "expired_at": 4_102_444_800i64,
        })
    }

    #[test]
    fn parses_single_instance_request() {
        let request = parse_grant(&instance_body(), Endpoint::Instance, Locale::En, NOW).unwrap();
        assert_eq!(request.operate, Operation::Grant);
        assert_eq!(request.subject, Subject::user("alice"));
        assert_eq!(request.action_ids, vec!["view"]);
        assert_eq!(
            request.resources,
            vec![ResourceExpression::instance("bk_cmdb", "host", "123")]
        );
        assert!(request.expired_at.is_never());
    }

    #[test]
    fn instance_accepts_an_empty_ancestor_chain() {
        let mut body = instance_body();
        body["resources"][0]["ancestors"] = json!([]);
        let request = parse_grant(&body, Endpoint::Instance, Locale::En, NOW).unwrap();
        assert_eq!(
            request.resources,
            vec![ResourceExpression::instance("bk_cmdb", "host", "123")]
        );
    }

    #[test]
    fn path_rejects_an_empty_ancestor_chain() {
        let body = json!({
            "operate": "grant",
            "subject": {"type": "user", "id": "alice"},
            "system": "bk_cmdb",
            "action": {"id": "view"},
            "resources": [{"system": "bk_cmdb", "type": "host", "ancestors": []}],
        });
        let detail = parse_grant(&body, Endpoint::Path, Locale::En, NOW).unwrap_err();
        assert_eq!(
            detail.to_json(),
            r#"{"resources":{"0":{"ancestors":["This list may not be empty."]}}}"#
        );
    }

    #[test]
    fn parses_batch_path_request() {
        let body = json!({
            "operate": "revoke",
            "subject": {"type": "group", "id": "7"},
            "system": "bk_cmdb",
            "actions": [{"id": "view"}, {"id": "edit"}],
            "resources": [{
                "system": "bk_cmdb",
                "type": "host",
                "ancestors": [{"type": "biz", "id": "1"}, {"type": "set", "id": "2"}],
            }],
            "expired_at": NOW + 60,
        });
        let request = parse_grant(&body, Endpoint::BatchPath, Locale::En, NOW).unwrap();
        assert_eq!(request.operate, Operation::Revoke);
        assert_eq!(request.action_ids, vec!["view", "edit"]);
        assert_eq!(request.resources[0].scope(), ResourceScope::Path);
        assert_eq!(request.resources[0].ancestors.len(), 2);
        assert_eq!(request.expired_at.as_timestamp(), NOW + 60);
    }

    #[test]
    fn missing_resource_id_is_keyed_by_position() {
        let mut body = instance_body();
        body["resources"] = json!([{"system": "bk_cmdb", "type": "host"}]);
        let detail = parse_grant(&body, Endpoint::Instance, Locale::En, NOW).unwrap_err();
        assert_eq!(
            detail.to_json(),
            r#"{"resources":{"0":{"id":["This field is required."]}}}"#
        );
        assert_eq!(
            one_line_error(&detail, Some(&*GRANT_SCHEMA)),
            "id: This field is required."
        );
    }

    #[test]
    fn path_endpoints_reject_ids_and_need_ancestors() {
        let body = json!({
            "operate": "grant",
            "subject": {"type": "user", "id": "alice"},
            "system": "bk_cmdb",
            "action": {"id": "view"},
            "resources": [{"system": "bk_cmdb", "type": "host", "id": "1"}],
        });
        let detail = parse_grant(&body, Endpoint::Path, Locale::En, NOW).unwrap_err();
        let ValidationNode::Keyed(fields) = &detail else {
            panic!("expected keyed detail, got {detail}");
        };
        assert_eq!(fields[0].0, "resources");
        assert!(detail.to_json().contains("\"id\""));
        assert!(detail.to_json().contains("\"ancestors\""));
    }

    #[test]
    fn batch_actions_must_be_unique() {
        let mut body = instance_body();
        body["actions"] = json!([{"id": "view"}, {"id": "view"}]);
        let detail = parse_grant(&body, Endpoint::BatchInstance, Locale::En, NOW).unwrap_err();
        assert_eq!(
            detail,
            ValidationNode::field("actions", ValidationNode::message("Action ids must be unique."))
        );
    }

    #[test]
    fn past_expiry_is_rejected() {
        let mut body = instance_body();
        body["expired_at"] = json!(NOW - 1);
        let detail = parse_grant(&body, Endpoint::Instance, Locale::En, NOW).unwrap_err();
        assert_eq!(
            one_line_error(&detail, Some(&*GRANT_SCHEMA)),
            "expired_at: Expiration time must be in the future."
        );
    }

    #[test]
    fn absent_expiry_means_never() {
        let mut body = instance_body();
        body.as_object_mut().unwrap().remove("expired_at");
        let request = parse_grant(&body, Endpoint::Instance, Locale::En, NOW).unwrap();
        assert!(request.expired_at.is_never());
    }

    #[test]
    fn messages_follow_locale() {
        let mut body = instance_body();
        body["operate"] = json!("delete");
        let detail = parse_grant(&body, Endpoint::Instance, Locale::Zh, NOW).unwrap_err();
        assert_eq!(
            detail,
            ValidationNode::field(
                "operate",
                ValidationNode::message(Locale::Zh.text(Msg::InvalidChoice))
            )
        );
    }

    #[test]
    fn non_object_body_is_a_non_field_error() {
        let detail = parse_grant(&json!([1, 2]), Endpoint::Instance, Locale::En, NOW).unwrap_err();
        assert_eq!(one_line_error(&detail, None), "Invalid data. Expected a dictionary.");
    }
}
