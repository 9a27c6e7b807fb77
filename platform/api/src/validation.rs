//! Structured field-validation detail and the single-line rendering shown to
//! internal callers.

use std::fmt;

use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::Value;

/// Key used for errors that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Validation errors mirroring the shape of the rejected input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationNode {
    Messages(Vec<String>),
    Keyed(Vec<(String, ValidationNode)>),
    Indexed(Vec<(usize, ValidationNode)>),
}

impl ValidationNode {
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Messages(vec![msg.into()])
    }

    pub fn field(key: impl Into<String>, node: ValidationNode) -> Self {
        Self::Keyed(vec![(key.into(), node)])
    }

    pub fn non_field(msg: impl Into<String>) -> Self {
        Self::field(NON_FIELD_ERRORS, Self::message(msg))
    }

    /// Builds a tree from framework-style JSON detail: strings and string
    /// lists are messages, objects are keyed errors, other lists are indexed.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::message(s.clone()),
            Value::Array(items) if items.iter().all(Value::is_string) => Self::Messages(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            Value::Array(items) => Self::Indexed(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i, Self::from_json(v)))
                    .collect(),
            ),
            Value::Object(map) => Self::Keyed(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
            other => Self::message(other.to_string()),
        }
    }

    /// Full detail as compact JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn first_child(&self) -> Option<&ValidationNode> {
        match self {
            Self::Messages(_) => None,
            Self::Keyed(entries) => entries.first().map(|(_, node)| node),
            Self::Indexed(entries) => entries.first().map(|(_, node)| node),
        }
    }
}

impl Serialize for ValidationNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Messages(messages) => messages.serialize(serializer),
            Self::Keyed(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, node) in entries {
                    map.serialize_entry(key, node)?;
                }
                map.end()
            }
            Self::Indexed(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (index, node) in entries {
                    map.serialize_entry(&index.to_string(), node)?;
                }
                map.end()
            }
        }
    }
}

impl fmt::Display for ValidationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

/// Shape of the input a validation tree was produced from.
#[derive(Clone, Debug)]
pub enum FieldKind {
    Scalar,
    Object(ObjectSchema),
    List(Box<FieldKind>),
}

impl FieldKind {
    pub fn list_of(item: FieldKind) -> Self {
        Self::List(Box::new(item))
    }

    fn as_object(&self) -> Option<&ObjectSchema> {
        match self {
            Self::Object(schema) => Some(schema),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: Option<&'static str>,
    pub kind: FieldKind,
}

#[derive(Clone, Debug, Default)]
pub struct ObjectSchema {
    fields: Vec<FieldSpec>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn scalar(self, key: &'static str, label: Option<&'static str>) -> Self {
        self.field(key, label, FieldKind::Scalar)
    }

    #[must_use]
    pub fn field(
        mut self,
        key: &'static str,
        label: Option<&'static str>,
        kind: FieldKind,
    ) -> Self {
        self.fields.push(FieldSpec { key, label, kind });
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }
}

/// Reduces a validation tree to one human-readable line by following the
/// first error down through nested objects and lists.
pub fn one_line_error(detail: &ValidationNode, schema: Option<&FieldKind>) -> String {
    match detail {
        ValidationNode::Messages(messages) => messages.first().cloned().unwrap_or_default(),
        ValidationNode::Indexed(entries) => match entries.first() {
            Some((_, child)) => one_line_error(child, item_kind(schema)),
            None => String::new(),
        },
        ValidationNode::Keyed(entries) => {
            let Some((key, error)) = entries.first() else {
                return String::new();
            };
            let field = schema
                .and_then(FieldKind::as_object)
                .and_then(|object| object.get(key));

            let message = match error {
                ValidationNode::Messages(messages) => messages.first().cloned().unwrap_or_default(),
                nested => {
                    match field.map(|f| &f.kind) {
                        Some(FieldKind::List(item)) => {
                            if let Some(child) = nested.first_child() {
                                return one_line_error(child, Some(item.as_ref()));
                            }
                        }
                        Some(kind) if kind.as_object().is_some() => {
                            return one_line_error(nested, Some(kind));
                        }
                        _ => {}
                    }
                    if let Some(FieldKind::List(item)) = schema {
                        return one_line_error(nested, Some(item.as_ref()));
                    }
                    nested.to_json()
                }
            };

            if key == NON_FIELD_ERRORS {
                return message;
            }
            let label = field.and_then(|f| f.label).unwrap_or(key.as_str());
            format!("{label}: {message}")
        }
    }
}

fn item_kind(schema: Option<&FieldKind>) -> Option<&FieldKind> {
    match schema {
        Some(FieldKind::List(item)) => Some(item.as_ref()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource_schema(id_label: Option<&'static str>) -> FieldKind {
        FieldKind::Object(
            ObjectSchema::new()
                .scalar("system", None)
                .field(
                    "resources",
                    Some("Resources"),
                    FieldKind::list_of(FieldKind::Object(
                        ObjectSchema::new().scalar("type", None).scalar("id", id_label),
                    )),
                ),
        )
    }

    #[test]
    fn nested_list_error_descends_into_first_item() {
        let detail = ValidationNode::from_json(&json!({"resources": {"0": {"id": ["required"]}}}));
        let schema = resource_schema(None);
        assert_eq!(one_line_error(&detail, Some(&schema)), "id: required");
    }

    #[test]
    fn registered_label_replaces_key() {
        let detail = ValidationNode::from_json(&json!({"resources": {"0": {"id": ["required"]}}}));
        let schema = resource_schema(Some("Resource ID"));
        assert_eq!(one_line_error(&detail, Some(&schema)), "Resource ID: required");
    }

    #[test]
    fn indexed_items_use_item_schema() {
        let detail = ValidationNode::field(
            "resources",
            ValidationNode::Indexed(vec![(
                2,
                ValidationNode::field("type", ValidationNode::message("This field is required.")),
            )]),
        );
        let schema = resource_schema(None);
        assert_eq!(
            one_line_error(&detail, Some(&schema)),
            "type: This field is required."
        );
    }

    #[test]
    fn top_level_message_list_returns_first_message() {
        let detail = ValidationNode::from_json(&json!(["first", "second"]));
        assert_eq!(one_line_error(&detail, None), "first");
    }

    #[test]
    fn non_field_errors_are_bare() {
        let detail = ValidationNode::non_field("actions conflict");
        assert_eq!(one_line_error(&detail, None), "actions conflict");
    }

    #[test]
    fn scalar_field_uses_label_or_key() {
        let schema =
            FieldKind::Object(ObjectSchema::new().scalar("expired_at", Some("Expiration")));
        let detail =
            ValidationNode::from_json(&json!({"expired_at": ["too early"], "system": ["x"]}));
        assert_eq!(one_line_error(&detail, Some(&schema)), "Expiration: too early");

        let detail = ValidationNode::from_json(&json!({"system": ["missing"]}));
        assert_eq!(one_line_error(&detail, Some(&schema)), "system: missing");
    }

    #[test]
    fn nested_detail_without_schema_is_rendered_as_json() {
        let detail = ValidationNode::from_json(&json!({"subject": {"id": ["required"]}}));
        assert_eq!(one_line_error(&detail, None), r#"subject: {"id":["required"]}"#);
    }

    #[test]
    fn list_schema_at_top_recurses_into_first_child() {
        let schema = FieldKind::list_of(FieldKind::Object(ObjectSchema::new().scalar("id", None)));
        let detail = ValidationNode::from_json(&json!({"0": {"id": ["bad"]}}));
        assert_eq!(one_line_error(&detail, Some(&schema)), "id: bad");
    }

    #[test]
    fn serializes_in_framework_shape() {
        let detail = ValidationNode::field(
            "resources",
            ValidationNode::Indexed(vec![(
                0,
                ValidationNode::field("id", ValidationNode::message("required")),
            )]),
        );
        assert_eq!(detail.to_json(), r#"{"resources":{"0":{"id":["required"]}}}"#);
    }
}
