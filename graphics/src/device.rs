//! Device handles.
//!
//! The core never talks to a GPU. A [`DeviceHandle`] is an opaque identifier
//! used only to decide device affinity and where cross-device transfers are
//! needed; the application maps handles to real devices and queues.

use std::fmt;

/// Opaque identifier of a GPU device (or queue family) owned by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(u32);

impl DeviceHandle {
    /// The device used when nothing else decides affinity.
    pub const PRIMARY: Self = Self(0);

    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for DeviceHandle {
    fn default() -> Self {
        Self::PRIMARY
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}
