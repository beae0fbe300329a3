use std::{collections::HashMap, fs, path::Path};

use infra_core::{ErrorCode, InfraError};
use infra_driver_proto::MachineClassMeta;
use serde::{Deserialize, Serialize};

/// Provider-independent part of a machine class forwarded to drivers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineClass {
    #[serde(default)]
    pub revision: i64,
    #[serde(default)]
    pub cloud_config: String,
    #[serde(default)]
    pub user_data: String,
}

/// Machine classes known to the daemon, keyed by class name.
#[derive(Debug, Clone, Default)]
pub struct MachineClassCatalog {
    classes: HashMap<String, MachineClass>,
}

impl MachineClassCatalog {
    pub fn new(classes: HashMap<String, MachineClass>) -> Self {
        Self { classes }
    }

    /// Loads a JSON object mapping class names to [`MachineClass`] entries.
    pub fn load(path: &Path) -> Result<Self, InfraError> {
        let bytes = fs::read(path).map_err(|err| {
            InfraError::new(ErrorCode::InvalidRequest, "read machine classes")
                .with_detail(format!("{}: {err}", path.display()))
        })?;
        let classes = serde_json::from_slice(&bytes).map_err(|err| {
            InfraError::new(ErrorCode::InvalidRequest, "parse machine classes")
                .with_detail(format!("{}: {err}", path.display()))
        })?;
        Ok(Self::new(classes))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns the wire metadata and class body for `name`.
    ///
    /// Unknown classes resolve to revision 0 with empty config; the driver
    /// decides whether that is acceptable.
    pub fn resolve(&self, name: &str) -> (MachineClassMeta, MachineClass) {
        let class = match self.classes.get(name) {
            Some(class) => class.clone(),
            None => {
                tracing::warn!(machine_class = name, "unknown machine class, forwarding defaults");
                MachineClass::default()
            }
        };
        let meta = MachineClassMeta {
            name: name.to_string(),
            revision: class.revision,
        };
        (meta, class)
    }
}
