use crate::error::{ForumError, Result};
use std::net::IpAddr;
use uuid::Uuid;

/// Caller identity as supplied by the upstream identity provider.
///
/// The forum never authenticates anyone itself; it only reads the user id,
/// the moderator capability, and the client address it was handed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: Option<Uuid>,
    pub is_moderator: bool,
    pub ip: Option<IpAddr>,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn moderator(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            is_moderator: true,
            ip: None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }

    pub fn require_user(&self, action: &str) -> Result<Uuid> {
        self.user_id.ok_or_else(|| {
            ForumError::Unauthenticated(format!("sign in to {}", action))
        })
    }

    pub fn require_moderator(&self) -> Result<Uuid> {
        let user_id = self.require_user("moderate")?;
        if self.is_moderator {
            Ok(user_id)
        } else {
            Err(ForumError::Unauthorized(
                "moderator capability required".to_string(),
            ))
        }
    }

    /// Whether hidden content by `author_id` stays visible to this viewer
    pub fn sees_hidden_of(&self, author_id: Option<Uuid>) -> bool {
        self.is_moderator || (self.user_id.is_some() && self.user_id == author_id)
    }
}
