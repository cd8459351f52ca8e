//! Teams, memberships and invitations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{Entity, EntityKind, Key, Slug};
use super::organization::{MemberRole, Organization};
use super::season::Season;
use super::user::{DeletionStatus, User};

/// A team belongs to exactly one organization and one season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: Key<Team>,
    pub slug: Slug,
    pub organization: Key<Organization>,
    pub season: Key<Season>,
    /// At most one default team per organization.
    pub is_default: bool,
    pub deletion_status: DeletionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Team {
    const KIND: EntityKind = EntityKind::Team;

    fn key(&self) -> Key<Self> {
        self.id
    }

    fn slug(&self) -> &Slug {
        &self.slug
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: Key<TeamMember>,
    pub slug: Slug,
    pub team: Key<Team>,
    pub user: Key<User>,
    pub role: MemberRole,
    pub deletion_status: DeletionStatus,
    pub created_at: DateTime<Utc>,
}

impl Entity for TeamMember {
    const KIND: EntityKind = EntityKind::TeamMember;

    fn key(&self) -> Key<Self> {
        self.id
    }

    fn slug(&self) -> &Slug {
        &self.slug
    }
}

/// Pending invitation; consumed (deleted) by acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamInvite {
    pub id: Key<TeamInvite>,
    pub slug: Slug,
    pub team: Key<Team>,
    pub user: Key<User>,
    pub created_at: DateTime<Utc>,
}

impl Entity for TeamInvite {
    const KIND: EntityKind = EntityKind::TeamInvite;

    fn key(&self) -> Key<Self> {
        self.id
    }

    fn slug(&self) -> &Slug {
        &self.slug
    }
}
