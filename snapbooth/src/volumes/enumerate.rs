//! Volume enumeration primitives.

use sysinfo::Disks;
use tracing::trace;

use crate::Result;

/// Blocking "enumerate attached volumes" primitive.
///
/// Implementations return one identifier per attached removable volume
/// (mount points on Unix, drive roots on Windows). Callers run this on the
/// blocking pool; implementations are free to do synchronous I/O.
pub trait VolumeEnumerator: Send + Sync + 'static {
    fn enumerate(&self) -> Result<Vec<String>>;
}

/// Production enumerator backed by the system disk list.
#[derive(Debug, Default)]
pub struct RemovableDiskEnumerator;

impl RemovableDiskEnumerator {
    pub fn new() -> Self {
        Self
    }
}

impl VolumeEnumerator for RemovableDiskEnumerator {
    fn enumerate(&self) -> Result<Vec<String>> {
        let disks = Disks::new_with_refreshed_list();
        let volumes: Vec<String> = disks
            .list()
            .iter()
            .filter(|d| d.is_removable())
            .map(|d| d.mount_point().to_string_lossy().into_owned())
            .collect();

        trace!(count = volumes.len(), "enumerated removable volumes");
        Ok(volumes)
    }
}
