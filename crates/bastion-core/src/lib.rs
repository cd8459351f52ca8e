//! bastion-core
//!
//! Control plane of a multi-tenant training platform: users, organizations,
//! teams, seasons, challenges and the instances a fleet of remote agents
//! hosts for them.
//!
//! # Modules
//! - **domain**: identifiers, entity rows, instance status machine, activities, errors
//! - **store**: the entity store (transactional arena, in-memory and file-backed)
//! - **ports**: seams to the outside (Clock, IdGenerator, AgentCapability, NotificationSource)
//! - **impls**: in-process port implementations (ScriptedAgentFleet, FixedNotifications)
//! - **app**: workflows, identity resolver, fleet coordinator, ledger and reports
//! - **config**: `ControlPlaneConfig` loaded from TOML

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod store;

pub use self::app::{ControlPlane, ControlPlaneBuilder};
pub use self::config::ControlPlaneConfig;
pub use self::domain::{ControlError, ErrorKind};
