//! Identity shapes read from the identity provider

use serde::{Deserialize, Serialize};

/// The authenticated account. Only id, name and email are ever read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "$id", alias = "id")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub email: String,
}

/// An email/password session
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Session {
    #[serde(rename = "$id")]
    pub id: String,

    #[serde(rename = "userId")]
    pub user_id: String,

    /// Token handed to the caller; empty unless minted with a server key
    #[serde(default)]
    pub secret: String,

    #[serde(default)]
    pub expire: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("secret", &"<redacted>")
            .field("expire", &self.expire)
            .finish()
    }
}
