use serde::{Deserialize, Serialize};

/// A monitored resource, e.g. one contact center instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceContext {
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ResourceContext {
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_arn: None,
            alias: None,
        }
    }

    pub fn with_arn(mut self, arn: impl Into<String>) -> Self {
        self.resource_arn = Some(arn.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Identifier passed to context-keyed lookups: the ARN when known, otherwise the id.
    pub fn lookup_context_id(&self) -> &str {
        self.resource_arn.as_deref().unwrap_or(&self.resource_id)
    }

    /// Human readable name used in alerts.
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.resource_id)
    }
}
