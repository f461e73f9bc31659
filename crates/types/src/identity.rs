use serde::{Deserialize, Serialize};

use crate::principal::Principal;

/// Authenticated caller identity handed out by an identity provider.
///
/// `delegation` is an opaque bearer credential; the client never inspects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub principal: Principal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation: Option<String>,
    /// Expiry as ns since the epoch; `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ns: Option<i64>,
}

impl Identity {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            delegation: None,
            expires_at_ns: None,
        }
    }

    pub fn with_delegation(mut self, token: impl Into<String>, expires_at_ns: i64) -> Self {
        self.delegation = Some(token.into());
        self.expires_at_ns = Some(expires_at_ns);
        self
    }

    pub fn is_expired_at(&self, now_ns: i64) -> bool {
        matches!(self.expires_at_ns, Some(exp) if exp <= now_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_boundary_is_expired() {
        let id = Identity::new("aaaaa-aa".parse().unwrap()).with_delegation("tok", 100);
        assert!(!id.is_expired_at(99));
        assert!(id.is_expired_at(100));
        assert!(!Identity::new(Principal::anonymous()).is_expired_at(i64::MAX));
    }
}
