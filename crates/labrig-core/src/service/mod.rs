//! Service supervisors: drive external services to ready/stopped by polling.
//!
//! # Modules
//!
//! - [`datastore`] - `DataStoreSupervisor` (system service, boolean outcome)
//! - [`backend`]   - `BackendSupervisor` (detached process, typed failures)
//! - [`preparer`]  - `DatabasePreparer` composing both
//! - [`probe`]     - liveness probes (status command, TCP, HTTP, session)
//! - [`marker`]    - readiness marker file
//! - [`poll`]      - bounded fixed-delay polling
//! - [`state`]     - `ServiceState`
//! - [`error`]     - `ServiceError` / `ServiceResult`

pub mod backend;
pub mod datastore;
pub mod error;
pub mod marker;
pub mod poll;
pub mod preparer;
pub mod probe;
pub mod state;

pub use backend::{BackendStart, BackendStop, BackendSupervisor};
pub use datastore::DataStoreSupervisor;
pub use error::{ServiceError, ServiceResult};
pub use marker::{FileReadinessMarker, MarkerStatus, ReadinessMarker};
pub use poll::poll_until;
pub use preparer::DatabasePreparer;
pub use probe::{BackendProbe, CommandStatusProbe, LivenessProbe, SystemBackendProbe};
pub use state::ServiceState;
