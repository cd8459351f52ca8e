//! In-process implementations of the ports, used by tests and the demo CLI.
//!
//! Production agents and notification services live behind the same traits
//! in their own crates.

pub mod notifications;
pub mod scripted_fleet;

pub use self::notifications::FixedNotifications;
pub use self::scripted_fleet::{ScriptedAgentFleet, StartScript};
