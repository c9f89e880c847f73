//! Database preparer: data store then backend, and the reverse on teardown.

use std::sync::Arc;

use tracing::info;

use super::backend::{BackendStart, BackendStop, BackendSupervisor};
use super::datastore::DataStoreSupervisor;
use super::{ServiceError, ServiceResult};
use crate::config::{BackendSettings, DataStoreSettings};
use crate::process::CommandExecutor;

/// Composes both supervisors into one prepare/teardown pair.
pub struct DatabasePreparer {
    datastore: DataStoreSupervisor,
    backend: BackendSupervisor,
}

impl DatabasePreparer {
    pub fn new(datastore: DataStoreSupervisor, backend: BackendSupervisor) -> Self {
        Self { datastore, backend }
    }

    /// Preparer wired to real probes, sharing one executor.
    pub fn from_settings(
        datastore: DataStoreSettings,
        backend: BackendSettings,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self::new(
            DataStoreSupervisor::with_status_command(datastore, executor.clone()),
            BackendSupervisor::from_settings(backend, executor),
        )
    }

    pub fn datastore(&self) -> &DataStoreSupervisor {
        &self.datastore
    }

    pub fn backend(&self) -> &BackendSupervisor {
        &self.backend
    }

    /// Start the data store, then the backend.
    ///
    /// Safe to call repeatedly: both supervisors re-check observed state
    /// first, so a second call does not launch a second backend.
    pub async fn prepare(&self) -> ServiceResult<BackendStart> {
        if !self.datastore.start().await? {
            return Err(ServiceError::NotReady {
                service: self.datastore.name().to_string(),
                attempts: self.datastore.settings().retries,
            });
        }
        let started = self.backend.start_backend().await?;
        info!(?started, "backend prepared");
        Ok(started)
    }

    /// Stop the backend, then the data store.
    pub async fn teardown(&self) -> ServiceResult<BackendStop> {
        let stopped = self.backend.stop_backend().await?;
        if !self.datastore.stop().await? {
            return Err(ServiceError::NotReady {
                service: self.datastore.name().to_string(),
                attempts: self.datastore.settings().retries,
            });
        }
        info!(?stopped, "backend torn down");
        Ok(stopped)
    }
}
