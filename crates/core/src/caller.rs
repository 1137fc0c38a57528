//! Caller identity.
//!
//! Requests are either anonymous or made on behalf of an authenticated user.
//! There is no placeholder user id for anonymous callers; code that needs an
//! owner matches on [`Caller`] instead.

use serde::{Deserialize, Serialize};

/// Identifier of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum Caller {
    #[default]
    Anonymous,
    User(UserId),
}

impl Caller {
    pub fn user(id: impl Into<String>) -> Self {
        Caller::User(UserId(id.into()))
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Caller::Anonymous => None,
            Caller::User(id) => Some(id),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Caller::Anonymous)
    }
}

impl std::fmt::Display for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Caller::Anonymous => write!(f, "anonymous"),
            Caller::User(id) => write!(f, "user:{id}"),
        }
    }
}
