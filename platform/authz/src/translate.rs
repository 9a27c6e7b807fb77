use std::sync::Arc;

use crate::{
    AuthzError,
    policy::PolicyDraft,
    resource::{ExpiredAt, ResourceExpression, ResourceScope},
    schema::ResourceSchema,
};

/// Converts request shapes into policy drafts, one per action.
///
/// Translation is pure apart from the schema lookup, so a single translator
/// is shared across requests.
#[derive(Clone)]
pub struct PolicyTranslator {
    schema: Arc<dyn ResourceSchema>,
}

impl PolicyTranslator {
    pub fn new(schema: Arc<dyn ResourceSchema>) -> Self {
        Self { schema }
    }

    pub fn for_instance(
        &self,
        system: &str,
        action_id: &str,
        resources: &[ResourceExpression],
        expired_at: ExpiredAt,
    ) -> Result<Vec<PolicyDraft>, AuthzError> {
        self.translate(system, &[action_id], resources, expired_at, ResourceScope::Instance)
    }

    pub fn for_path(
        &self,
        system: &str,
        action_id: &str,
        resources: &[ResourceExpression],
        expired_at: ExpiredAt,
    ) -> Result<Vec<PolicyDraft>, AuthzError> {
        self.translate(system, &[action_id], resources, expired_at, ResourceScope::Path)
    }

    pub fn for_instances<A: AsRef<str>>(
        &self,
        system: &str,
        action_ids: &[A],
        resources: &[ResourceExpression],
        expired_at: ExpiredAt,
    ) -> Result<Vec<PolicyDraft>, AuthzError> {
        self.translate(system, action_ids, resources, expired_at, ResourceScope::Instance)
    }

    pub fn for_paths<A: AsRef<str>>(
        &self,
        system: &str,
        action_ids: &[A],
        resources: &[ResourceExpression],
        expired_at: ExpiredAt,
    ) -> Result<Vec<PolicyDraft>, AuthzError> {
        self.translate(system, action_ids, resources, expired_at, ResourceScope::Path)
    }

    fn translate<A: AsRef<str>>(
        &self,
        system: &str,
        action_ids: &[A],
        resources: &[ResourceExpression],
        expired_at: ExpiredAt,
        scope: ResourceScope,
    ) -> Result<Vec<PolicyDraft>, AuthzError> {
        for expr in resources {
            self.check_expression(system, expr, scope)?;
        }
        Ok(action_ids
            .iter()
            .map(|action_id| PolicyDraft::new(system, action_id.as_ref(), resources, expired_at))
            .collect())
    }

    fn check_expression(
        &self,
        system: &str,
        expr: &ResourceExpression,
        scope: ResourceScope,
    ) -> Result<(), AuthzError> {
        if expr.system != system {
            return Err(AuthzError::invalid_resource(
                expr,
                format!("resource belongs to system {}, request targets {system}", expr.system),
            ));
        }
        match (scope, expr.scope()) {
            (ResourceScope::Instance, ResourceScope::Path) => {
                return Err(AuthzError::invalid_resource(expr, "instance id is missing"));
            }
            (ResourceScope::Path, ResourceScope::Instance) => {
                return Err(AuthzError::invalid_resource(
                    expr,
                    "path scoped resources must not carry an instance id",
                ));
            }
            (ResourceScope::Path, ResourceScope::Path) if expr.ancestors.is_empty() => {
                return Err(AuthzError::invalid_resource(expr, "path is empty"));
            }
            _ => {}
        }
        self.schema.check(expr)?;
        Ok(())
    }
}

impl std::fmt::Debug for PolicyTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyTranslator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        resource::PathNode,
        schema::{PermissiveSchema, StaticResourceSchema},
    };

    fn translator() -> PolicyTranslator {
        PolicyTranslator::new(Arc::new(PermissiveSchema))
    }

    fn hosts() -> Vec<ResourceExpression> {
        vec![
            ResourceExpression::instance("bk_cmdb", "host", "123"),
            ResourceExpression::instance("bk_cmdb", "host", "456"),
        ]
    }

    #[test]
    fn single_instance_yields_one_draft_with_all_resources() {
        let drafts = translator()
            .for_instance("bk_cmdb", "view", &hosts(), ExpiredAt::NEVER)
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].action_id, "view");
        assert_eq!(drafts[0].resource_expressions, hosts());
        assert_eq!(drafts[0].expired_at, ExpiredAt::NEVER);
    }

    #[test]
    fn single_path_yields_one_draft() {
        let group = vec![ResourceExpression::path(
            "bk_cmdb",
            "host",
            vec![PathNode::new("group", "1")],
        )];
        let drafts = translator()
            .for_path("bk_cmdb", "edit", &group, ExpiredAt::from_timestamp(4_000_000_000))
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].resource_expressions, group);
    }

    #[test]
    fn batch_fans_out_in_action_order() {
        let actions = ["edit", "view", "delete"];
        let drafts = translator()
            .for_instances("bk_cmdb", &actions, &hosts(), ExpiredAt::NEVER)
            .unwrap();
        let ids: Vec<_> = drafts.iter().map(|d| d.action_id.as_str()).collect();
        assert_eq!(ids, actions);
        assert!(drafts.iter().all(|d| d.resource_expressions == hosts()));
    }

    #[test]
    fn batch_paths_share_the_resource_set() {
        let path = vec![ResourceExpression::path(
            "bk_cmdb",
            "host",
            vec![PathNode::new("group", "1")],
        )];
        let actions = vec!["view".to_string(), "edit".to_string()];
        let drafts = translator()
            .for_paths("bk_cmdb", &actions, &path, ExpiredAt::NEVER)
            .unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[1].action_id, "edit");
        assert_eq!(drafts[1].resource_expressions, path);
    }

    #[test]
    fn scope_mismatch_is_invalid_resource_kind() {
        let path = vec![ResourceExpression::path(
            "bk_cmdb",
            "host",
            vec![PathNode::new("group", "1")],
        )];
        let err = translator()
            .for_instance("bk_cmdb", "view", &path, ExpiredAt::NEVER)
            .unwrap_err();
        assert!(matches!(err, AuthzError::InvalidResourceKind { .. }));

        let err = translator()
            .for_paths("bk_cmdb", &["view"], &hosts(), ExpiredAt::NEVER)
            .unwrap_err();
        assert!(matches!(err, AuthzError::InvalidResourceKind { .. }));
    }

    #[test]
    fn foreign_system_is_rejected() {
        let job = vec![ResourceExpression::instance("bk_job", "script", "1")];
        let err = translator()
            .for_instance("bk_cmdb", "view", &job, ExpiredAt::NEVER)
            .unwrap_err();
        assert!(err.to_string().contains("bk_job"), "got: {err}");
    }

    #[test]
    fn schema_violations_surface_through_translation() {
        let schema = StaticResourceSchema::default().with_type("bk_cmdb", "host", &["biz", "set"]);
        let translator = PolicyTranslator::new(Arc::new(schema));
        let bad = vec![
            ResourceExpression::instance("bk_cmdb", "host", "1")
                .with_ancestors(vec![PathNode::new("set", "1"), PathNode::new("biz", "1")]),
        ];
        let err = translator
            .for_instance("bk_cmdb", "view", &bad, ExpiredAt::NEVER)
            .unwrap_err();
        assert!(matches!(err, AuthzError::InvalidResourceKind { .. }));

        let unknown = vec![ResourceExpression::instance("bk_cmdb2", "host", "1")];
        let err = translator
            .for_instance("bk_cmdb2", "view", &unknown, ExpiredAt::NEVER)
            .unwrap_err();
        assert!(matches!(err, AuthzError::UnknownSystem(system) if system == "bk_cmdb2"));
    }

    #[test]
    fn translation_is_deterministic() {
        let t = translator();
        let first = t.for_instances("bk_cmdb", &["view", "edit"], &hosts(), ExpiredAt::NEVER);
        let second = t.for_instances("bk_cmdb", &["view", "edit"], &hosts(), ExpiredAt::NEVER);
        assert_eq!(first.unwrap(), second.unwrap());
    }
}
