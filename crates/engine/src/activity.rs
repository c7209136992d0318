//! Activity records
//!
//! An activity says that a user acted on a resource at some point in time.

use serde::{Deserialize, Serialize};

/// One (timestamp, user, resource) interaction event.
///
/// The timestamp may be any totally ordered type; only relative order is
/// used. Identifiers are opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity<T> {
    /// When the user acted
    pub timestamp: T,

    /// Acting user
    pub user: String,

    /// Resource acted on
    pub resource: String,
}

impl<T> Activity<T> {
    pub fn new(timestamp: T, user: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            timestamp,
            user: user.into(),
            resource: resource.into(),
        }
    }

    /// First missing identifier, if any
    pub(crate) fn missing_field(&self) -> Option<&'static str> {
        if self.user.trim().is_empty() {
            Some("user")
        } else if self.resource.trim().is_empty() {
            Some("resource")
        } else {
            None
        }
    }
}

impl<T, U, R> From<(T, U, R)> for Activity<T>
where
    U: Into<String>,
    R: Into<String>,
{
    fn from((timestamp, user, resource): (T, U, R)) -> Self {
        Self::new(timestamp, user, resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_triple() {
        let activity: Activity<u32> = (7, "alice", "http://www.quuxlabs.com/").into();
        assert_eq!(activity.timestamp, 7);
        assert_eq!(activity.user, "alice");
        assert_eq!(activity.resource, "http://www.quuxlabs.com/");
        assert_eq!(activity.missing_field(), None);
    }

    #[test]
    fn test_blank_identifiers() {
        assert_eq!(Activity::new(1, "  ", "R").missing_field(), Some("user"));
        assert_eq!(Activity::new(1, "bob", "").missing_field(), Some("resource"));
    }
}
