use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider-specific translation between machine specs and cloud SDK shapes.
pub trait ProviderAdapter: Send + Sync {
    /// Provider name drivers register under.
    fn name(&self) -> &str;

    /// Provider resource id for a VM named `vm_name`.
    fn provider_id(&self, vm_name: &str) -> String;

    /// Builds one attachable data disk per requested disk for `vm_name`.
    fn data_disks(&self, vm_name: &str, disks: &[DataDiskSpec]) -> Vec<DataDisk>;

    /// Extracts provider volume identifiers from persistent volume specs,
    /// skipping volumes this provider does not own.
    fn volume_names(&self, volumes: &[VolumeSpec]) -> Result<Vec<String>, ProviderError>;
}

/// A data disk requested by a machine class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDiskSpec {
    /// Optional disk name fragment.
    #[serde(default)]
    pub name: String,
    /// Host caching mode, empty for the provider default.
    #[serde(default)]
    pub caching: String,
    /// Storage tier, e.g. `Premium_LRS`.
    pub storage_account_type: String,
    /// Disk size in GiB.
    pub disk_size_gb: i32,
    /// Explicit attachment slot.
    #[serde(default)]
    pub lun: Option<i32>,
}

/// How a data disk is provisioned on attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskCreateOption {
    /// Attach a new, empty volume.
    Empty,
}

/// Provider-ready data disk descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDisk {
    pub lun: i32,
    pub name: String,
    pub caching: String,
    pub managed_disk: ManagedDisk,
    pub disk_size_gb: i32,
    pub create_option: DiskCreateOption,
}

/// Managed disk parameters of a [`DataDisk`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedDisk {
    pub storage_account_type: String,
}

/// Volume source of a persistent volume; at most one field is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    #[serde(default)]
    pub azure_disk: Option<AzureDiskSource>,
    #[serde(default)]
    pub csi: Option<CsiSource>,
    #[serde(default)]
    pub host_path: Option<HostPathSource>,
}

/// In-tree Azure disk reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureDiskSource {
    pub disk_name: String,
}

/// Out-of-tree CSI volume reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsiSource {
    pub driver: String,
    pub volume_handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPathSource {
    pub path: String,
}

/// Errors emitted by provider adapters.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No adapter exists for the requested provider.
    #[error("unsupported provider: {0}")]
    Unsupported(String),
}
