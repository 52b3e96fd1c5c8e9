use serde::{Deserialize, Serialize};

/// Tenant role supplied by the auth service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Editor,
    Viewer,
}

impl Role {
    /// Viewers follow along but never lock or mutate blocks.
    pub fn can_edit(self) -> bool {
        !matches!(self, Role::Viewer)
    }
}

/// Caller identity, trusted as given once the session is authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub name: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            role,
        }
    }

    pub fn editor(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(user_id, name, Role::Editor)
    }
}
