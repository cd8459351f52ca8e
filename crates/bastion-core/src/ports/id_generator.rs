//! IdGenerator port: surface identifiers for newly created entities.
//!
//! Durable keys come from the store; slugs are generated here so they are
//! unique without coordination and sort by creation time.

use ulid::Ulid;

use crate::domain::{EntityKind, Slug};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    /// Fresh slug for an entity of `kind`, e.g. `team-member-01hq...`.
    fn slug(&self, kind: EntityKind) -> Slug;
}

/// ULID based generator; the timestamp part comes from the clock.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn slug(&self, kind: EntityKind) -> Slug {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        Slug::new(format!("{}-{}", kind, ulid.to_string().to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn slugs_are_unique_and_prefixed() {
        let ids = UlidGenerator::new(SystemClock);
        let a = ids.slug(EntityKind::TeamMember);
        let b = ids.slug(EntityKind::TeamMember);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("team-member-"));
    }

    #[test]
    fn timestamp_part_follows_the_clock() {
        let fixed = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let ids = UlidGenerator::new(FixedClock::new(fixed));
        let slug = ids.slug(EntityKind::Team);
        let ulid = Ulid::from_string(&slug.as_str()["team-".len()..].to_uppercase()).unwrap();
        assert_eq!(ulid.timestamp_ms(), fixed.timestamp_millis() as u64);
    }
}
