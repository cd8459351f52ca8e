//! Domain model: identifiers, entity rows, status machine, audit records, errors.

pub mod activity;
pub mod agent;
pub mod challenge;
pub mod errors;
pub mod ids;
pub mod organization;
pub mod season;
pub mod state;
pub mod team;
pub mod user;

pub use self::activity::{Activity, ActivityKind, ActivityRefs, Coupon, NewActivity};
pub use self::agent::{Agent, AgentAddress};
pub use self::challenge::{
    Challenge, ChallengeFlavor, ChallengeInstance, ChallengeSubscription, SubscriptionStatus,
};
pub use self::errors::{ControlError, ErrorKind};
pub use self::ids::{Entity, EntityKind, Key, Slug};
pub use self::organization::{MemberRole, Organization, OrganizationMember};
pub use self::season::{Season, SeasonChallenge, Visibility};
pub use self::state::{InstanceStatus, ReportedStatus};
pub use self::team::{Team, TeamInvite, TeamMember};
pub use self::user::{Claims, DeletionStatus, User, gravatar_url};
