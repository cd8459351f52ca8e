//! Ports: the seams between the control plane and the outside world.
//!
//! Each trait hides a collaborator that is either nondeterministic (time,
//! identifiers) or remote (agents, notification service), so workflows can be
//! driven deterministically in tests.

pub mod agent_capability;
pub mod clock;
pub mod id_generator;
pub mod notifications;

pub use self::agent_capability::{AgentCapability, CapabilityError, StartAck, StartRequest, with_deadline};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::notifications::NotificationSource;
