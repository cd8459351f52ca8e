//! Users and the identity-provider claims that map onto them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ids::{Entity, EntityKind, Key, Slug};
use super::season::Season;
use super::team::TeamMember;

/// Soft-deletion marker shared by users, organizations, teams and members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStatus {
    #[default]
    Active,
    Deleted,
}

impl DeletionStatus {
    pub fn is_active(self) -> bool {
        matches!(self, DeletionStatus::Active)
    }
}

/// Claims handed over by the identity provider after authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub subject: String,
    pub preferred_username: String,
    pub email: String,
    pub email_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Key<User>,
    pub slug: Slug,
    pub username: String,
    pub email: String,
    pub gravatar_url: String,
    pub oauth_subject: String,
    pub active_team_member: Option<Key<TeamMember>>,
    pub active_season: Option<Key<Season>>,
    pub deletion_status: DeletionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Onboarding sets both active pointers in the same transaction.
    pub fn is_onboarded(&self) -> bool {
        self.active_team_member.is_some() && self.active_season.is_some()
    }
}

impl Entity for User {
    const KIND: EntityKind = EntityKind::User;

    fn key(&self) -> Key<Self> {
        self.id
    }

    fn slug(&self) -> &Slug {
        &self.slug
    }
}

/// Avatar URL derived from the normalized e-mail address.
pub fn gravatar_url(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    format!("https://www.gravatar.com/avatar/{}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gravatar_ignores_case_and_whitespace() {
        assert_eq!(gravatar_url(" A@X.com "), gravatar_url("a@x.com"));
        assert!(gravatar_url("a@x.com").starts_with("https://www.gravatar.com/avatar/"));
    }
}
