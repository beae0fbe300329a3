use std::collections::BTreeSet;

use infra_provider::{
    DataDisk, DataDiskSpec, DiskCreateOption, ManagedDisk, ProviderAdapter, ProviderError,
    VolumeSpec,
};

/// Provider name Azure drivers register under.
pub const PROVIDER_NAME: &str = "azure";

/// Host caching applied when a disk does not ask for one.
const DEFAULT_CACHING: &str = "None";

/// Azure implementation of [`ProviderAdapter`].
#[derive(Debug, Clone, Default)]
pub struct AzureAdapter {
    /// Resource group machines are created in.
    resource_group: String,
}

impl AzureAdapter {
    pub fn new(resource_group: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
        }
    }
}

impl ProviderAdapter for AzureAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    /// `azure:///<resource group>/<vm name>`
    fn provider_id(&self, vm_name: &str) -> String {
        format!("azure:///{}/{}", self.resource_group, vm_name)
    }

    fn data_disks(&self, vm_name: &str, disks: &[DataDiskSpec]) -> Vec<DataDisk> {
        let explicit: BTreeSet<i32> = disks.iter().filter_map(|disk| disk.lun).collect();
        let mut next_free = 0;

        disks
            .iter()
            .map(|disk| {
                let lun = match disk.lun {
                    Some(lun) => lun,
                    None => {
                        while explicit.contains(&next_free) {
                            next_free += 1;
                        }
                        let lun = next_free;
                        next_free += 1;
                        lun
                    }
                };

                let caching = if disk.caching.is_empty() {
                    DEFAULT_CACHING.to_string()
                } else {
                    disk.caching.clone()
                };

                let descriptor = DataDisk {
                    lun,
                    name: data_disk_name(vm_name, &disk.name, lun),
                    caching,
                    managed_disk: ManagedDisk {
                        storage_account_type: disk.storage_account_type.clone(),
                    },
                    disk_size_gb: disk.disk_size_gb,
                    create_option: DiskCreateOption::Empty,
                };
                tracing::debug!(vm = vm_name, disk = %descriptor.name, lun, "prepared data disk");
                descriptor
            })
            .collect()
    }

    fn volume_names(&self, volumes: &[VolumeSpec]) -> Result<Vec<String>, ProviderError> {
        let mut names = Vec::new();
        for volume in volumes {
            if let Some(azure_disk) = &volume.azure_disk {
                names.push(azure_disk.disk_name.clone());
            } else if let Some(csi) = &volume.csi
                && !csi.volume_handle.is_empty()
            {
                names.push(csi.volume_handle.clone());
            }
        }
        Ok(names)
    }
}

fn data_disk_name(vm_name: &str, disk_name: &str, lun: i32) -> String {
    if disk_name.is_empty() {
        format!("{vm_name}-{lun}-data-disk")
    } else {
        format!("{vm_name}-{disk_name}-{lun}-data-disk")
    }
}

#[cfg(test)]
mod tests {
    use super::{AzureAdapter, PROVIDER_NAME};
    use infra_provider::{
        AzureDiskSource, CsiSource, DataDisk, DataDiskSpec, DiskCreateOption, HostPathSource,
        ManagedDisk, ProviderAdapter, VolumeSpec,
    };

    fn disk(name: &str, tier: &str, size: i32, lun: Option<i32>) -> DataDiskSpec {
        DataDiskSpec {
            name: name.to_string(),
            caching: String::new(),
            storage_account_type: tier.to_string(),
            disk_size_gb: size,
            lun,
        }
    }

    fn expected(lun: i32, name: &str, tier: &str, size: i32) -> DataDisk {
        DataDisk {
            lun,
            name: name.to_string(),
            caching: "None".to_string(),
            managed_disk: ManagedDisk {
                storage_account_type: tier.to_string(),
            },
            disk_size_gb: size,
            create_option: DiskCreateOption::Empty,
        }
    }

    fn host_path() -> VolumeSpec {
        VolumeSpec {
            host_path: Some(HostPathSource {
                path: "/mnt/data".to_string(),
            }),
            ..VolumeSpec::default()
        }
    }

    fn csi(driver: &str, handle: &str) -> VolumeSpec {
        VolumeSpec {
            csi: Some(CsiSource {
                driver: driver.to_string(),
                volume_handle: handle.to_string(),
            }),
            ..VolumeSpec::default()
        }
    }

    #[test]
    fn converts_disks_with_explicit_luns() {
        let adapter = AzureAdapter::default();
        let mut disks = vec![
            disk("sdb", "Premium_LRS", 10, Some(1)),
            disk("sdc", "Standard_LRS", 100, Some(2)),
        ];
        disks[0].caching = "None".to_string();
        disks[1].caching = "None".to_string();

        assert_eq!(
            adapter.data_disks("vm", &disks),
            vec![
                expected(1, "vm-sdb-1-data-disk", "Premium_LRS", 10),
                expected(2, "vm-sdc-2-data-disk", "Standard_LRS", 100),
            ]
        );
    }

    #[test]
    fn assigns_default_caching_and_luns() {
        let adapter = AzureAdapter::default();
        let disks = vec![
            disk("sdb", "Premium_LRS", 10, None),
            disk("", "Standard_LRS", 100, None),
            disk("sdc", "Standard_LRS", 100, Some(42)),
        ];

        assert_eq!(
            adapter.data_disks("vm", &disks),
            vec![
                expected(0, "vm-sdb-0-data-disk", "Premium_LRS", 10),
                expected(1, "vm-1-data-disk", "Standard_LRS", 100),
                expected(42, "vm-sdc-42-data-disk", "Standard_LRS", 100),
            ]
        );
    }

    #[test]
    fn disks_without_luns_are_numbered_from_zero() {
        let adapter = AzureAdapter::default();
        let disks = vec![
            disk("sdb", "Premium_LRS", 10, None),
            disk("sdc", "Standard_LRS", 100, None),
            disk("sdd", "Standard_LRS", 100, None),
        ];

        assert_eq!(
            adapter.data_disks("vm", &disks),
            vec![
                expected(0, "vm-sdb-0-data-disk", "Premium_LRS", 10),
                expected(1, "vm-sdc-1-data-disk", "Standard_LRS", 100),
                expected(2, "vm-sdd-2-data-disk", "Standard_LRS", 100),
            ]
        );
    }

    #[test]
    fn auto_luns_skip_explicit_ones_regardless_of_position() {
        let adapter = AzureAdapter::default();
        let disks = vec![
            disk("a", "Standard_LRS", 1, None),
            disk("b", "Standard_LRS", 1, None),
            disk("c", "Standard_LRS", 1, Some(0)),
            disk("d", "Standard_LRS", 1, Some(2)),
        ];

        let luns: Vec<i32> = adapter
            .data_disks("vm", &disks)
            .into_iter()
            .map(|disk| disk.lun)
            .collect();
        assert_eq!(luns, vec![1, 3, 0, 2]);
    }

    #[test]
    fn explicit_luns_are_kept_even_when_they_collide() {
        let adapter = AzureAdapter::default();
        let disks = vec![
            disk("a", "Standard_LRS", 1, Some(5)),
            disk("b", "Standard_LRS", 1, Some(5)),
        ];

        let luns: Vec<i32> = adapter
            .data_disks("vm", &disks)
            .into_iter()
            .map(|disk| disk.lun)
            .collect();
        assert_eq!(luns, vec![5, 5]);
    }

    #[test]
    fn requested_caching_is_kept() {
        let adapter = AzureAdapter::default();
        let mut requested = disk("logs", "Premium_LRS", 64, Some(3));
        requested.caching = "ReadOnly".to_string();

        let disks = adapter.data_disks("vm", &[requested]);
        assert_eq!(disks[0].caching, "ReadOnly");
    }

    #[test]
    fn extracts_in_tree_disk_names() {
        let adapter = AzureAdapter::default();
        let volumes = vec![
            VolumeSpec {
                azure_disk: Some(AzureDiskSource {
                    disk_name: "disk-1".to_string(),
                }),
                ..VolumeSpec::default()
            },
            host_path(),
        ];

        assert_eq!(
            adapter.volume_names(&volumes).expect("volume names"),
            vec!["disk-1".to_string()]
        );
    }

    #[test]
    fn extracts_csi_handles_in_order() {
        let adapter = AzureAdapter::default();
        let volumes = vec![
            csi("io.kubernetes.storage.mock", "vol-2"),
            csi("disk.csi.azure.com", "vol-1"),
            host_path(),
        ];

        assert_eq!(
            adapter.volume_names(&volumes).expect("volume names"),
            vec!["vol-2".to_string(), "vol-1".to_string()]
        );
    }

    #[test]
    fn csi_without_handle_is_skipped() {
        let adapter = AzureAdapter::default();
        let volumes = vec![csi("disk.csi.azure.com", ""), VolumeSpec::default()];

        assert!(adapter.volume_names(&volumes).expect("volume names").is_empty());
    }

    #[test]
    fn provider_id_includes_resource_group() {
        let adapter = AzureAdapter::new("shoot--core");
        assert_eq!(adapter.name(), PROVIDER_NAME);
        assert_eq!(adapter.provider_id("vm-1"), "azure:///shoot--core/vm-1");
    }
}
