//! Service scopes a token can authorize.

use serde::{Deserialize, Serialize};

/// A downstream service covered by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceScope {
    Reg,
    Rrs,
}

impl ServiceScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceScope::Reg => "reg",
            ServiceScope::Rrs => "rrs",
        }
    }

    pub fn parse(value: &str) -> Option<ServiceScope> {
        match value {
            "reg" => Some(ServiceScope::Reg),
            "rrs" => Some(ServiceScope::Rrs),
            _ => None,
        }
    }

    /// Every known scope, in canonical order.
    pub fn all() -> Vec<ServiceScope> {
        vec![ServiceScope::Reg, ServiceScope::Rrs]
    }

    /// Token audience string for this scope.
    pub fn audience(&self) -> String {
        format!("rezilient:{}", self.as_str())
    }
}

impl std::fmt::Display for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
