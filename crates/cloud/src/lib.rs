//! Cloud connector contract
//!
//! One capability interface implemented per provider, plus the bounded
//! polling primitive used to wait on long-running cloud operations.
//!
//! Providers with a managed-group abstraction additionally expose the
//! [`GroupScaler`] capability; VM-per-instance providers do not, and the
//! engine converges them one instance at a time.

pub mod connector;
pub mod error;
pub mod mock;
pub mod types;
pub mod waiter;

pub use connector::*;
pub use error::CloudError;
pub use mock::MockCloud;
pub use types::*;
pub use waiter::OperationWaiter;
