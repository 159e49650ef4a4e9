//! External collaborators behind traits.
//!
//! Each store is injected into the gateway at construction. Production
//! implementations talk HTTP; in-memory ones back tests and single-node
//! deployments.

pub mod control_plane;
pub mod credentials;
pub mod objects;
pub mod presence;
pub mod telemetry;

pub use control_plane::{ControlPlane, HttpControlPlane, LogControlPlane};
pub use credentials::{CredentialStore, StaticCredentialStore};
pub use objects::{HttpObjectStore, MemoryObjectStore, ObjectStore};
pub use presence::{MemoryPresenceStore, PresenceStore, PresenceTracker};
pub use telemetry::{TelemetrySink, TracingTelemetrySink};
