//! Model registry and instantiation.
//!
//! Native models are looked up by GUID. A [`ModelFactory`] stands in for the
//! loaded native unit: it turns an [`InstantiateContext`] into a fresh
//! [`FmuInstance`].

use crate::capability::Capability;
use crate::error::{ModelError, ModelResult};
use crate::handle::ModelHandle;
use crate::instance::FmuInstance;
use crate::logging::InstanceLogger;
use crate::source::UnpackedFmu;
use crate::status::FmiResult;
use fmu_core::{FmuKind, ModelDescription};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Arguments passed to a factory at instantiation.
#[derive(Debug, Clone)]
pub struct InstantiateContext {
    pub instance_name: String,
    pub kind: FmuKind,
    pub guid: String,
    pub resource_dir: PathBuf,
    pub visible: bool,
    pub logger: InstanceLogger,
}

/// Creates instances of one model.
pub trait ModelFactory: Send + Sync {
    fn instantiate(&self, ctx: &InstantiateContext) -> FmiResult<Box<dyn FmuInstance>>;
}

impl<F> ModelFactory for F
where
    F: Fn(&InstantiateContext) -> FmiResult<Box<dyn FmuInstance>> + Send + Sync,
{
    fn instantiate(&self, ctx: &InstantiateContext) -> FmiResult<Box<dyn FmuInstance>> {
        self(ctx)
    }
}

/// Factories keyed by model GUID.
#[derive(Default, Clone)]
pub struct ModelRegistry {
    factories: HashMap<String, Arc<dyn ModelFactory>>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut guids: Vec<&String> = self.factories.keys().collect();
        guids.sort();
        f.debug_struct("ModelRegistry").field("guids", &guids).finish()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        guid: impl Into<String>,
        factory: impl ModelFactory + 'static,
    ) -> ModelResult<()> {
        let guid = guid.into();
        if guid.is_empty() {
            return Err(ModelError::InvalidArgument {
                what: "model GUID is empty".to_string(),
            });
        }
        if self.factories.contains_key(&guid) {
            return Err(ModelError::InvalidArgument {
                what: format!("model {guid} is already registered"),
            });
        }
        self.factories.insert(guid, Arc::new(factory));
        Ok(())
    }

    pub fn contains(&self, guid: &str) -> bool {
        self.factories.contains_key(guid)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiate the model extracted in `dir`.
    pub fn instantiate(
        &self,
        dir: &Path,
        description: Arc<ModelDescription>,
        kind: FmuKind,
        logging_on: bool,
        visible: bool,
    ) -> ModelResult<ModelHandle> {
        if !dir.is_dir() {
            return Err(ModelError::InstantiationFailed {
                reason: format!("model directory {} does not exist", dir.display()),
            });
        }
        self.create(dir, description, kind, logging_on, visible, None)
    }

    /// Like [`instantiate`](Self::instantiate); the handle keeps `fmu` alive.
    pub fn instantiate_unpacked(
        &self,
        fmu: Arc<UnpackedFmu>,
        description: Arc<ModelDescription>,
        kind: FmuKind,
        logging_on: bool,
        visible: bool,
    ) -> ModelResult<ModelHandle> {
        let dir = fmu.dir().to_path_buf();
        self.create(&dir, description, kind, logging_on, visible, Some(fmu))
    }

    fn create(
        &self,
        dir: &Path,
        description: Arc<ModelDescription>,
        kind: FmuKind,
        logging_on: bool,
        visible: bool,
        unpacked: Option<Arc<UnpackedFmu>>,
    ) -> ModelResult<ModelHandle> {
        let Some(name) = description.model_identifier(kind).map(str::to_string) else {
            return Err(ModelError::UnsupportedCapability {
                capability: match kind {
                    FmuKind::CoSimulation => Capability::CoSimulation,
                    FmuKind::ModelExchange => Capability::ModelExchange,
                },
            });
        };
        let factory = self.factories.get(&description.guid).ok_or_else(|| {
            ModelError::InstantiationFailed {
                reason: format!("no model registered for GUID {}", description.guid),
            }
        })?;

        let logger = InstanceLogger::new(&name, logging_on);
        let ctx = InstantiateContext {
            instance_name: name.clone(),
            kind,
            guid: description.guid.clone(),
            resource_dir: dir.join("resources"),
            visible,
            logger: logger.clone(),
        };
        let instance = factory
            .instantiate(&ctx)
            .map_err(|fault| ModelError::InstantiationFailed {
                reason: fault.to_string(),
            })?;
        Ok(ModelHandle::new(
            name,
            kind,
            description,
            instance,
            logger,
            unpacked,
        ))
    }
}
