//! # Store Adapter
//!
//! The identity entity ("Person") and the trait surface the import pipeline
//! uses to talk to a directory-backed store.
//!
//! The pipeline never accesses the underlying directory protocol directly;
//! it only sees the capability traits defined here:
//!
//! - [`PersonSearch`] - load existing entries
//! - [`PersonCreate`], [`PersonModify`], [`PersonRemove`] - mutating operations
//! - [`PersonStore`] - marker for adapters implementing all of the above
//!
//! [`MemoryPersonStore`] is an in-process reference implementation used by
//! tests and the CLI demo mode. Directory adapters (LDAP etc.) live outside
//! this repository and plug in through the same traits.

pub mod error;
pub mod memory;
pub mod person;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryPersonStore, MutationCounts};
pub use person::{NewPerson, Person, PersonId};
pub use traits::{PersonCreate, PersonModify, PersonRemove, PersonSearch, PersonStore};

// Re-export async_trait for adapter implementors
pub use async_trait::async_trait;
