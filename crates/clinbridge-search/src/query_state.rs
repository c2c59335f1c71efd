use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pagination cursor of one search call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryState {
    pub offset: usize,
    pub count: usize,
    /// Total matches, known once the repository has answered.
    pub total: Option<usize>,
    /// Opaque continuation token, echoed across pages.
    pub state_token: String,
}

impl QueryState {
    /// A cursor with the given token, or a freshly minted one.
    pub fn new(offset: usize, count: usize, state_token: Option<String>) -> Self {
        Self {
            offset,
            count,
            total: None,
            state_token: state_token.unwrap_or_else(|| Uuid::new_v4().to_string()),
        }
    }

    #[must_use]
    pub fn with_total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }

    /// Whether rows remain beyond this page.
    pub fn has_more(&self) -> bool {
        self.total
            .is_some_and(|total| self.count > 0 && self.offset + self.count < total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mints_token_when_absent() {
        let a = QueryState::new(0, 10, None);
        let b = QueryState::new(0, 10, None);
        assert_ne!(a.state_token, b.state_token);
        assert_eq!(QueryState::new(0, 10, Some("t".into())).state_token, "t");
    }

    #[test]
    fn test_has_more() {
        assert!(QueryState::new(0, 10, None).with_total(11).has_more());
        assert!(!QueryState::new(10, 10, None).with_total(20).has_more());
        assert!(!QueryState::new(0, 10, None).has_more());
        assert!(!QueryState::new(0, 0, None).with_total(5).has_more());
    }
}
