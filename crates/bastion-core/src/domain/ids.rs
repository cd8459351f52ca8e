//! Entity identifiers.
//!
//! Every entity has two identifiers:
//! - a numeric durable [`Key`], allocated by the store and never reused;
//! - a surface [`Slug`], unique within its [`EntityKind`] and used by callers.
//!
//! `Key<E>` carries the entity type as a phantom marker so that a team key
//! can never be passed where a user key is expected. The marker costs no
//! memory: a key is exactly one `u64`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Kind of an entity, used to scope surface identifiers and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    User,
    Organization,
    OrganizationMember,
    Team,
    TeamMember,
    TeamInvite,
    Season,
    Challenge,
    ChallengeFlavor,
    SeasonChallenge,
    ChallengeInstance,
    ChallengeSubscription,
    Agent,
    Activity,
    Coupon,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Organization => "organization",
            EntityKind::OrganizationMember => "organization-member",
            EntityKind::Team => "team",
            EntityKind::TeamMember => "team-member",
            EntityKind::TeamInvite => "team-invite",
            EntityKind::Season => "season",
            EntityKind::Challenge => "challenge",
            EntityKind::ChallengeFlavor => "challenge-flavor",
            EntityKind::SeasonChallenge => "season-challenge",
            EntityKind::ChallengeInstance => "challenge-instance",
            EntityKind::ChallengeSubscription => "challenge-subscription",
            EntityKind::Agent => "agent",
            EntityKind::Activity => "activity",
            EntityKind::Coupon => "coupon",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every row type; ties the row to its kind and identifiers.
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn key(&self) -> Key<Self>;

    fn slug(&self) -> &Slug;
}

/// Numeric durable key of an entity of type `E`.
///
/// Trait impls are written by hand so that they do not require `E` itself to
/// be `Copy`/`Ord`/etc.
#[repr(transparent)]
pub struct Key<E> {
    raw: u64,
    _marker: PhantomData<fn() -> E>,
}

impl<E> Key<E> {
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub const fn raw(self) -> u64 {
        self.raw
    }
}

impl<E> Clone for Key<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Key<E> {}

impl<E> PartialEq for Key<E> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<E> Eq for Key<E> {}

impl<E> PartialOrd for Key<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Key<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<E> Hash for Key<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<E: Entity> fmt::Debug for Key<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", E::KIND, self.raw)
    }
}

impl<E: Entity> fmt::Display for Key<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", E::KIND, self.raw)
    }
}

impl<E> Serialize for Key<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.raw)
    }
}

impl<'de, E> Deserialize<'de> for Key<E> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u64::deserialize(deserializer).map(Self::from_raw)
    }
}

/// Surface identifier, unique within an [`EntityKind`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Slug {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Slug {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
