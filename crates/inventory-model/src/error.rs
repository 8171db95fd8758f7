//! Inventory validation errors.
//!
//! All of these are fatal: a run never starts against an inventory
//! that fails validation, so nothing is partially applied.

use std::net::IpAddr;
use thiserror::Error;

/// Errors detected while validating a set of machine definitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Two machines share a name
    #[error("duplicate machine name: {name}")]
    DuplicateName {
        /// The repeated machine name
        name: String,
    },

    /// Two machines share a static address
    #[error("duplicate static address {address}: declared by both '{first}' and '{second}'")]
    DuplicateAddress {
        /// The repeated address
        address: IpAddr,
        /// Machine that declared the address first
        first: String,
        /// Machine that declared it again
        second: String,
    },

    /// A depends_on entry names a machine not in the inventory
    #[error("machine '{machine}' depends on unknown machine '{dependency}'")]
    UnknownDependency { machine: String, dependency: String },

    /// A machine lists itself in depends_on
    #[error("machine '{machine}' depends on itself")]
    SelfDependency { machine: String },

    /// The depends_on graph contains a cycle
    #[error("dependency cycle: {}", path.join(" -> "))]
    DependencyCycle {
        /// Machines forming the cycle, first repeated at the end
        path: Vec<String>,
    },

    /// Two steps on the same machine share an id
    #[error("machine '{machine}' has duplicate step id '{step}'")]
    DuplicateStepId { machine: String, step: String },

    /// A machine has an empty name
    #[error("machine name may not be empty")]
    EmptyName,

    /// A machine name cannot serve as a state key
    #[error("invalid machine name '{name}': must not contain path separators or start with '.'")]
    InvalidName { name: String },
}

/// Result type for inventory validation.
pub type Result<T> = std::result::Result<T, ValidationError>;
