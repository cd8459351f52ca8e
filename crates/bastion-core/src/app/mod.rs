//! App - the control plane's application layer.
//!
//! Combines the store and the ports into the entry points callers use.
//!
//! # Main components
//! - **ControlPlaneBuilder / ControlPlane**: wiring, startup validation, dispatch
//! - **Workflow engine**: typed workflows behind a name-keyed registry
//! - **Identity resolver** and **session** view
//! - **FleetCoordinator**: heartbeats, stale-agent sweep, redump
//! - **FleetLoops**: the sweep timer and the heartbeat stream consumer
//! - **Ledger** and **reports**: read-only queries over one snapshot

pub mod builder;
pub mod context;
pub mod engine;
pub mod fleet;
pub mod identity;
pub mod ledger;
pub mod loops;
pub mod reports;
pub mod session;
pub mod workflows;

#[cfg(test)]
pub(crate) mod testing;

pub use self::builder::{BuildError, ControlPlane, ControlPlaneBuilder};
pub use self::context::{Services, WorkflowContext};
pub use self::engine::{DynWorkflow, RegistryError, Workflow, WorkflowRegistry};
pub use self::fleet::{FleetCoordinator, HeartbeatReport, RedumpOutcome, RedumpReport, RedumpTarget, StatusChange};
pub use self::identity::ResolvedIdentity;
pub use self::ledger::{ActivityFilter, ActivityView};
pub use self::loops::{FleetLoops, HeartbeatSignal};
pub use self::reports::{
    AgentReport, ChallengeReport, FlavorReport, InstanceReport, OrganizationReport, TeamReport, UserReport,
};
pub use self::session::{SeasonEntry, Session};
