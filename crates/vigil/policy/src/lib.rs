//! Policy management and evaluation for Vigil.
//!
//! The registry holds the authoritative policy set with snapshot reads and
//! a transactional reload from a declarative source. The engine composes
//! the registry with the cooldown registry to turn metric mappings into
//! ordered violations and remediation intents.

mod cooldown;
mod engine;
mod error;
mod registry;
mod source;
pub mod target;

pub use cooldown::{CooldownKey, CooldownRegistry};
pub use engine::{Evaluation, PolicyEngine};
pub use error::{PolicyError, Result};
pub use registry::{PolicyPatch, PolicyRegistry};
pub use source::{load_policy_file, parse_policy_document, PolicyDocument};
