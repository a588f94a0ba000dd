use sysinfo::Disks;

/// Raw free/total space for one drive, before any report-level filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct DriveStatus {
    pub drive_letter: String,
    pub total_space_gb: f64,
    pub free_space_gb: f64,
}

impl DriveStatus {
    pub fn not_ready(drive_letter: &str) -> Self {
        Self {
            drive_letter: drive_letter.to_string(),
            total_space_gb: 0.0,
            free_space_gb: 0.0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.total_space_gb > 0.0
    }
}

pub trait DiskStatusProvider {
    /// Never fails: unknown or not-ready drives come back zeroed.
    fn status(&self, drive_letter: &str) -> DriveStatus;
}

/// Reads live disk data through sysinfo, matching the configured drive
/// identifier against either the disk name or its mount point.
pub struct SystemDisks;

impl DiskStatusProvider for SystemDisks {
    fn status(&self, drive_letter: &str) -> DriveStatus {
        let disks = Disks::new_with_refreshed_list();
        for disk in disks.iter() {
            let name_matches = *disk.name() == *drive_letter;
            let mount_matches = disk.mount_point().as_os_str() == drive_letter;
            if name_matches || mount_matches {
                return DriveStatus {
                    drive_letter: drive_letter.to_string(),
                    total_space_gb: disk.total_space() as f64 * 1.0e-9,
                    free_space_gb: disk.available_space() as f64 * 1.0e-9,
                };
            }
        }
        DriveStatus::not_ready(drive_letter)
    }
}
