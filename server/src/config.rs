use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use platform_authz::{PermissiveSchema, ResourceSchema, StaticResourceSchema};
use serde::Deserialize;
use tracing::info;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// What each calling app may manage; empty admits any app that
    /// identifies itself.
    pub app_permissions: AppPermissions,
    pub resource_schema_path: Option<PathBuf>,
    pub cors_allowed_origins: Vec<String>,
    pub request_timeout: Duration,
    pub body_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_permissions: AppPermissions::default(),
            resource_schema_path: None,
            cors_allowed_origins: Vec::new(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let app_permissions = match std::env::var("APP_PERMISSIONS_PATH") {
            Ok(raw) if !raw.trim().is_empty() => {
                let path = PathBuf::from(raw.trim());
                let document = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read app permissions {}", path.display()))?;
                AppPermissions::from_json(&document)
                    .with_context(|| format!("invalid app permissions {}", path.display()))?
            }
            _ => AppPermissions::default(),
        };

        let resource_schema_path = std::env::var("RESOURCE_SCHEMA_PATH")
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from);

        let cors_allowed_origins = split_list(
            &std::env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:5173".into()),
        );

        let request_timeout = match std::env::var("REQUEST_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.trim()
                    .parse()
                    .with_context(|| format!("invalid REQUEST_TIMEOUT_SECS {raw:?}"))?,
            ),
            Err(_) => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let body_limit = match std::env::var("BODY_LIMIT_BYTES") {
            Ok(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("invalid BODY_LIMIT_BYTES {raw:?}"))?,
            Err(_) => DEFAULT_BODY_LIMIT,
        };

        Ok(Self {
            app_permissions,
            resource_schema_path,
            cors_allowed_origins,
            request_timeout,
            body_limit,
        })
    }

    /// Loads the resource-type schema, falling back to accepting every
    /// expression when no file is configured.
    pub fn resource_schema(&self) -> Result<Arc<dyn ResourceSchema>> {
        let Some(path) = &self.resource_schema_path else {
            info!("no RESOURCE_SCHEMA_PATH configured; ancestor chains are not checked");
            return Ok(Arc::new(PermissiveSchema));
        };
        let document = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read resource schema {}", path.display()))?;
        let schema = StaticResourceSchema::from_json(&document)
            .with_context(|| format!("invalid resource schema {}", path.display()))?;
        Ok(Arc::new(schema))
    }
}

/// Action id standing for every action of a system.
pub const ANY_ACTION: &str = "*";

/// Allow-list keyed by app code, then system id, holding action ids.
///
/// ```json
/// {"bk_sops": {"bk_cmdb": ["view", "edit"]}, "bk_job": {"bk_job": ["*"]}}
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct AppPermissions(HashMap<String, HashMap<String, Vec<String>>>);

impl AppPermissions {
    pub fn from_json(document: &str) -> Result<Self> {
        serde_json::from_str(document).context("app permissions must map app -> system -> actions")
    }

    pub fn with_actions(mut self, app_code: &str, system: &str, actions: &[&str]) -> Self {
        self.0
            .entry(app_code.to_string())
            .or_default()
            .entry(system.to_string())
            .or_default()
            .extend(actions.iter().map(|action| action.to_string()));
        self
    }

    fn unrestricted(&self) -> bool {
        self.0.is_empty()
    }

    fn actions(&self, app_code: &str, system: &str) -> &[String] {
        self.0
            .get(app_code)
            .and_then(|systems| systems.get(system))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether `app_code` may call the grant endpoints at all.
    pub fn knows(&self, app_code: &str) -> bool {
        self.unrestricted() || self.0.contains_key(app_code)
    }

    /// Whether `app_code` may manage every action of `system`.
    pub fn allows_system(&self, app_code: &str, system: &str) -> bool {
        self.unrestricted() || self.actions(app_code, system).iter().any(|a| a == ANY_ACTION)
    }

    pub fn allows_action(&self, app_code: &str, system: &str, action_id: &str) -> bool {
        self.unrestricted()
            || self
                .actions(app_code, system)
                .iter()
                .any(|a| a == ANY_ACTION || a == action_id)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_skip_blanks() {
        assert_eq!(split_list(" bk_sops, ,bk_job,"), vec!["bk_sops", "bk_job"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn empty_permissions_admit_everyone() {
        let permissions = AppPermissions::default();
        assert!(permissions.knows("bk_sops"));
        assert!(permissions.allows_system("bk_sops", "bk_cmdb"));
        assert!(permissions.allows_action("bk_sops", "bk_cmdb", "view"));
    }

    #[test]
    fn permissions_are_scoped_by_system_and_action() {
        let permissions = AppPermissions::from_json(
            r#"{"bk_sops": {"bk_cmdb": ["view"]}, "bk_job": {"bk_job": ["*"]}}"#,
        )
        .unwrap();
        assert!(!permissions.knows("bk_log"));

        assert!(permissions.allows_action("bk_sops", "bk_cmdb", "view"));
        assert!(!permissions.allows_action("bk_sops", "bk_cmdb", "edit"));
        assert!(!permissions.allows_system("bk_sops", "bk_cmdb"));

        assert!(permissions.allows_system("bk_job", "bk_job"));
        assert!(permissions.allows_action("bk_job", "bk_job", "execute"));
        assert!(!permissions.allows_action("bk_job", "bk_cmdb", "view"));
    }

    #[test]
    fn malformed_permissions_are_rejected() {
        assert!(AppPermissions::from_json(r#"{"bk_sops": ["bk_cmdb"]}"#).is_err());
    }
}
