//! Battery telemetry agent core
//!
//! One publisher task owns the connection supervisor, the discovery flag and
//! the publish policy. Everything else only observes.

pub mod discovery;
pub mod lifecycle;
pub mod policy;
pub mod publisher;
pub mod status;
pub mod supervisor;

pub use discovery::{AnnounceReport, DiscoveryAnnouncer};
pub use lifecycle::{AgentLifecycle, LifecycleError};
pub use policy::PublishPolicy;
pub use publisher::{PublisherOptions, TelemetryPublisher, TickOutcome, TickReport};
pub use status::{ConnectionState, ConnectionStatus, StatusSnapshot};
pub use supervisor::{ConnectOutcome, ConnectionSupervisor, Delivery};
