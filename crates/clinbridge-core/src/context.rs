//! Per-request context.
//!
//! The context is created once by the transport layer for an authenticated
//! request and handed to every component explicitly. Concurrent units of work
//! spawned on behalf of a request each receive their own clone.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display: None,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub identity: Option<Identity>,
}

impl RequestContext {
    pub fn new(identity: Option<Identity>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            identity,
        }
    }

    /// Context for work not attributed to any caller.
    pub fn anonymous() -> Self {
        Self::new(None)
    }

    pub fn authenticated(identity: Identity) -> Self {
        Self::new(Some(identity))
    }

    /// User id recorded as provenance author.
    pub fn author(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.user_id.as_str())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author() {
        let ctx = RequestContext::authenticated(Identity::new("dr-who").with_display("Doctor"));
        assert_eq!(ctx.author(), Some("dr-who"));
        assert_eq!(RequestContext::anonymous().author(), None);
    }

    #[test]
    fn test_clone_keeps_request_id() {
        let ctx = RequestContext::authenticated(Identity::new("u1"));
        let copy = ctx.clone();
        assert_eq!(copy.request_id, ctx.request_id);
        assert_ne!(RequestContext::anonymous().request_id, ctx.request_id);
    }
}
