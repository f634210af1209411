//! GCE provider
//!
//! REST client for the GCE compute v1 API plus the [`GceConnector`]
//! implementation of the cloud capability interface. GCE has managed
//! instance groups, so this connector exposes the group-scaler
//! capability: node groups are driven through instance templates,
//! instance group managers and autoscalers rather than instance by
//! instance.

pub mod client;
pub mod connector;
pub mod models;

pub use client::ComputeClient;
pub use connector::GceConnector;
