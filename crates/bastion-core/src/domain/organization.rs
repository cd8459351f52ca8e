//! Organizations and their members.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{Entity, EntityKind, Key, Slug};
use super::user::{DeletionStatus, User};

/// Role of a user inside an organization or a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Member,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Key<Organization>,
    pub slug: Slug,
    pub name: String,
    pub gravatar_url: String,
    /// Auto-created single-user organization.
    pub solo: bool,
    pub deletion_status: DeletionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Organization {
    const KIND: EntityKind = EntityKind::Organization;

    fn key(&self) -> Key<Self> {
        self.id
    }

    fn slug(&self) -> &Slug {
        &self.slug
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationMember {
    pub id: Key<OrganizationMember>,
    pub slug: Slug,
    pub organization: Key<Organization>,
    pub user: Key<User>,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
}

impl Entity for OrganizationMember {
    const KIND: EntityKind = EntityKind::OrganizationMember;

    fn key(&self) -> Key<Self> {
        self.id
    }

    fn slug(&self) -> &Slug {
        &self.slug
    }
}
