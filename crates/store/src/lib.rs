//! Cluster store
//!
//! Pluggable persistence behind narrow async traits: cluster and
//! node-group records plus the credential, SSH-key and CA material the
//! engine threads through to its collaborators.
//!
//! Two providers ship in-tree: [`MemoryStore`] for tests and
//! [`LocalStore`], one YAML document per resource beneath a root
//! directory. The engine treats any store error as fatal to the current
//! reconciliation step; conflict resolution is last-write-wins.

pub mod error;
pub mod local;
pub mod memory;
mod traits;

pub use error::StoreError;
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use traits::*;
