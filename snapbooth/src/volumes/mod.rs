//! Removable-volume tracking.
//!
//! The watcher keeps an up-to-date snapshot of attached removable volumes
//! without hammering the OS: a poll loop whose interval backs off
//! exponentially on failure and resets on success or on an explicit refresh
//! request. Enumeration itself is a blocking, platform-specific primitive
//! behind the [`VolumeEnumerator`] trait.

mod enumerate;
mod watcher;

pub use enumerate::{RemovableDiskEnumerator, VolumeEnumerator};
pub use watcher::{VolumeWatcher, VolumeWatcherConfig};
