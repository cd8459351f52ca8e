//! Seasons and their challenge catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::challenge::ChallengeFlavor;
use super::ids::{Entity, EntityKind, Key, Slug};

/// Public seasons are offered to every user in their session view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub id: Key<Season>,
    pub slug: Slug,
    pub name: String,
    /// Exactly one season is the default at any time once bootstrapped.
    pub is_default: bool,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Season {
    const KIND: EntityKind = EntityKind::Season;

    fn key(&self) -> Key<Self> {
        self.id
    }

    fn slug(&self) -> &Slug {
        &self.slug
    }
}

/// Links a flavor into a season's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonChallenge {
    pub id: Key<SeasonChallenge>,
    pub slug: Slug,
    pub season: Key<Season>,
    pub flavor: Key<ChallengeFlavor>,
    pub created_at: DateTime<Utc>,
}

impl Entity for SeasonChallenge {
    const KIND: EntityKind = EntityKind::SeasonChallenge;

    fn key(&self) -> Key<Self> {
        self.id
    }

    fn slug(&self) -> &Slug {
        &self.slug
    }
}
