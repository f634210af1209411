//! Scaleway provider
//!
//! REST client for the Scaleway instance and account APIs plus the
//! [`ScalewayConnector`] implementation of the cloud capability
//! interface. Scaleway has no managed-group abstraction, so the
//! connector does not expose the group-scaler capability: the engine
//! converges node groups one VM at a time.

pub mod client;
pub mod connector;
pub mod models;

pub use client::ScalewayClient;
pub use connector::ScalewayConnector;
