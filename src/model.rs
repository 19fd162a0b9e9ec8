use serde::{Deserialize, Serialize};

pub mod admin;
pub mod learner;

/// Access role stored on a user row.
///
/// The column is plain text; values written by this server are validated, but
/// rows written by older tooling may carry anything. Unknown text reads as
/// `Normal`, the narrowest visibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Enhanced,
    Normal,
}

impl Role {
    pub fn parse(raw: &str) -> Role {
        Role::try_parse(raw).unwrap_or(Role::Normal)
    }

    /// Strict variant used when validating admin writes.
    pub fn try_parse(raw: &str) -> Option<Role> {
        match raw {
            "admin" => Some(Role::Admin),
            "enhanced" => Some(Role::Enhanced),
            "normal" => Some(Role::Normal),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Enhanced => "enhanced",
            Role::Normal => "normal",
        }
    }

    /// Whether enhanced-only lessons belong to this role's eligible set.
    pub fn sees_enhanced_only(self) -> bool {
        !matches!(self, Role::Normal)
    }
}

/// Name shown for a user anywhere one is rendered: the trimmed display name
/// when present, else the local part of the email, else "Unknown".
pub fn display_name(display_name: Option<&str>, email: &str) -> String {
    if let Some(name) = display_name {
        let trimmed = name.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let local_part = email.split('@').next().unwrap_or("").trim();
    if local_part.is_empty() {
        "Unknown".to_string()
    } else {
        local_part.to_string()
    }
}
