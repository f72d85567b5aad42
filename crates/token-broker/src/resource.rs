//! Downstream resources and the scopes they require

use serde::Deserialize;

use crate::error::{Error, Result};

/// How a token for a resource is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustFlow {
    /// The signed-in user's session, subject to consent
    DelegatedUser,
    /// The identity bound to this process or host
    WorkloadIdentity,
}

impl TrustFlow {
    /// Label for logging and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustFlow::DelegatedUser => "delegated_user",
            TrustFlow::WorkloadIdentity => "workload_identity",
        }
    }
}

/// A named downstream dependency plus the permission strings to call it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceScope {
    pub name: String,
    pub scopes: Vec<String>,
    pub flow: TrustFlow,
}

impl ResourceScope {
    pub fn new(name: impl Into<String>, scopes: &[&str], flow: TrustFlow) -> Self {
        Self {
            name: name.into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            flow,
        }
    }
}

/// Immutable set of resources known at startup, kept in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ResourceCatalog {
    resources: Vec<ResourceScope>,
}

impl ResourceCatalog {
    /// Build a catalog, rejecting blank names, duplicate names and empty scope sets.
    pub fn new(resources: Vec<ResourceScope>) -> Result<Self> {
        for (i, resource) in resources.iter().enumerate() {
            if resource.name.trim().is_empty() {
                return Err(Error::Configuration(format!(
                    "resource #{i} has an empty name"
                )));
            }
            if resource.scopes.iter().all(|s| s.trim().is_empty()) {
                return Err(Error::Configuration(format!(
                    "resource {} declares no scopes",
                    resource.name
                )));
            }
            if resources[..i].iter().any(|r| r.name == resource.name) {
                return Err(Error::Configuration(format!(
                    "resource {} declared more than once",
                    resource.name
                )));
            }
        }
        Ok(Self { resources })
    }

    pub fn get(&self, name: &str) -> Option<&ResourceScope> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceScope> {
        self.resources.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openai() -> ResourceScope {
        ResourceScope::new(
            "openai",
            &["https://cognitiveservices.azure.com/.default"],
            TrustFlow::WorkloadIdentity,
        )
    }

    fn graph() -> ResourceScope {
        ResourceScope::new(
            "graph",
            &["User.Read", "Application.ReadWrite.All"],
            TrustFlow::DelegatedUser,
        )
    }

    #[test]
    fn lookup_by_name_preserves_scope_order() {
        let catalog = ResourceCatalog::new(vec![openai(), graph()]).unwrap();
        let graph = catalog.get("graph").unwrap();
        assert_eq!(graph.scopes, vec!["User.Read", "Application.ReadWrite.All"]);
        assert_eq!(graph.flow, TrustFlow::DelegatedUser);
        assert!(catalog.get("storage").is_none());
        assert_eq!(catalog.names(), vec!["openai", "graph"]);
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = ResourceCatalog::new(vec![graph(), graph()]).unwrap_err();
        assert!(err.to_string().contains("more than once"), "got: {err}");
    }

    #[test]
    fn empty_scopes_rejected() {
        let empty = ResourceScope::new("empty", &[], TrustFlow::WorkloadIdentity);
        assert!(ResourceCatalog::new(vec![empty]).is_err());
    }

    #[test]
    fn blank_name_rejected() {
        let blank = ResourceScope::new(" ", &["x"], TrustFlow::WorkloadIdentity);
        assert!(matches!(
            ResourceCatalog::new(vec![blank]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn flow_deserializes_from_snake_case() {
        let resource: ResourceScope = serde_json::from_str(
            r#"{"name":"graph","scopes":["User.Read"],"flow":"delegated_user"}"#,
        )
        .unwrap();
        assert_eq!(resource.flow, TrustFlow::DelegatedUser);
        assert_eq!(resource.flow.as_str(), "delegated_user");
    }
}
