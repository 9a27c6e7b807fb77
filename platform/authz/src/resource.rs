use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    User,
    Group,
    Service,
}

impl SubjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            SubjectType::User => "user",
            SubjectType::Group => "group",
            SubjectType::Service => "service",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(SubjectType::User),
            "group" => Some(SubjectType::Group),
            "service" => Some(SubjectType::Service),
            _ => None,
        }
    }
}

/// The grantee of a policy.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Subject {
    #[serde(rename = "type")]
    pub kind: SubjectType,
    pub id: String,
}

impl Subject {
    pub fn new(kind: SubjectType, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::new(SubjectType::User, id)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// One node of a topology path, e.g. `biz:1`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct PathNode {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

impl PathNode {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceScope {
    Instance,
    Path,
}

/// A resource target inside one system.
///
/// With an `id` the expression names a single instance; without one it
/// covers the node described by `ancestors` and everything beneath it.
/// `ancestors` is ordered root-to-leaf.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ResourceExpression {
    pub system: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub ancestors: Vec<PathNode>,
}

impl ResourceExpression {
    pub fn instance(
        system: impl Into<String>,
        kind: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            system: system.into(),
            kind: kind.into(),
            id: Some(id.into()),
            ancestors: Vec::new(),
        }
    }

    pub fn path(
        system: impl Into<String>,
        kind: impl Into<String>,
        ancestors: Vec<PathNode>,
    ) -> Self {
        Self {
            system: system.into(),
            kind: kind.into(),
            id: None,
            ancestors,
        }
    }

    #[must_use]
    pub fn with_ancestors(mut self, ancestors: Vec<PathNode>) -> Self {
        self.ancestors = ancestors;
        self
    }

    pub fn scope(&self) -> ResourceScope {
        if self.id.is_some() {
            ResourceScope::Instance
        } else {
            ResourceScope::Path
        }
    }
}

/// Policy expiry as a Unix timestamp; [`ExpiredAt::NEVER`] marks a permanent grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ExpiredAt(i64);

impl ExpiredAt {
    /// 2100-01-01T00:00:00Z.
    pub const NEVER: ExpiredAt = ExpiredAt(4_102_444_800);

    pub fn from_timestamp(secs: i64) -> Self {
        Self(secs)
    }

    pub fn as_timestamp(self) -> i64 {
        self.0
    }

    pub fn is_never(self) -> bool {
        self == Self::NEVER
    }

    /// True when the value is the never sentinel or lies after `now`.
    pub fn is_valid_at(self, now: i64) -> bool {
        self.is_never() || self.0 > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_follows_terminal_id() {
        let host = ResourceExpression::instance("bk_cmdb", "host", "123");
        assert_eq!(host.scope(), ResourceScope::Instance);

        let subtree =
            ResourceExpression::path("bk_cmdb", "host", vec![PathNode::new("biz", "1")]);
        assert_eq!(subtree.scope(), ResourceScope::Path);
    }

    #[test]
    fn expression_wire_shape_uses_type_key() {
        let expr = ResourceExpression::path("bk_cmdb", "host", vec![PathNode::new("group", "1")]);
        let value = serde_json::to_value(&expr).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "system": "bk_cmdb",
                "type": "host",
                "ancestors": [{"type": "group", "id": "1"}],
            })
        );
    }

    #[test]
    fn expiry_accepts_sentinel_and_future_only() {
        let now = 1_700_000_000;
        assert!(ExpiredAt::NEVER.is_valid_at(now));
        assert!(ExpiredAt::from_timestamp(now + 60).is_valid_at(now));
        assert!(!ExpiredAt::from_timestamp(now).is_valid_at(now));
    }

    #[test]
    fn subject_displays_as_type_and_id() {
        assert_eq!(Subject::user("alice").to_string(), "user:alice");
        assert_eq!(SubjectType::parse("group"), Some(SubjectType::Group));
        assert_eq!(SubjectType::parse("robot"), None);
    }
}
