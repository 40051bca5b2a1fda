//! Storage Service
//!
//! A named pairing of an initialized storage driver and the configuration
//! scope it was initialized with. The service name is the key under which
//! its results appear in every aggregated response.

use crate::config::ConfigScope;
use crate::domain::{Capabilities, StorageDriver};
use crate::error::{Error, Result};
use crate::schema::ResponseSchema;
use crate::task::{Task, TaskContext, TaskEngine};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct StorageService {
    name: String,
    driver: Arc<dyn StorageDriver>,
    config: ConfigScope,
    engine: Arc<TaskEngine>,
}

impl std::fmt::Debug for StorageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageService")
            .field("name", &self.name)
            .field("driver", &self.driver.name())
            .field("capabilities", &self.driver.capabilities())
            .finish()
    }
}

impl StorageService {
    pub(crate) fn new(
        name: String,
        driver: Arc<dyn StorageDriver>,
        config: ConfigScope,
        engine: Arc<TaskEngine>,
    ) -> Self {
        Self {
            name,
            driver,
            config,
            engine,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver(&self) -> &Arc<dyn StorageDriver> {
        &self.driver
    }

    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }

    pub fn config(&self) -> &ConfigScope {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.driver.capabilities()
    }

    pub fn supports(&self, capability: Capabilities) -> bool {
        self.capabilities().contains(capability)
    }

    /// `Unsupported` unless the driver implements the operation
    pub fn require(&self, capability: Capabilities, operation: &str) -> Result<()> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(Error::Unsupported {
                service: self.name.clone(),
                operation: operation.to_string(),
            })
        }
    }

    /// Run `f` as a task targeting this service
    pub fn task_execute<T, F, Fut>(
        self: &Arc<Self>,
        cancel: &CancellationToken,
        schema: Option<ResponseSchema>,
        f: F,
    ) -> Arc<Task<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce(TaskContext, Arc<StorageService>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let service = self.clone();
        self.engine
            .execute(cancel, Some(&self.name), schema, move |ctx| f(ctx, service))
    }
}
