mod collections;
pub mod types;
pub mod error;
pub mod config;
pub mod world;
pub mod host;
pub mod access;
pub mod registry;
pub mod storage;
pub mod search;
pub mod allocator;
pub mod markers;
pub mod scheduler;
pub mod service;

pub use config::Config;
pub use registry::{ChestRegistry, ContainerRecord};
pub use service::{DeathChests, Death, DeathOutcome, BreakDecision, OpenOutcome};
pub use world::{Level, WorldAccess};

mod prelude {
    pub(crate) use crate::collections::*;
    pub(crate) use crate::types::*;
}
