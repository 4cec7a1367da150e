//! Notification bridge: named events that reach the device from other code
//! in the process or, through a signal file, from other processes.

mod center;
mod signal_file;

pub use center::{NotificationCenter, Subscription};
pub use signal_file::{SignalFile, SignalListener};

use std::fmt;

/// Notifications the device understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationName {
    /// Flip between the clear and obstructed image.
    ChangeImage,
}

impl NotificationName {
    pub const ALL: [NotificationName; 1] = [NotificationName::ChangeImage];

    /// Name as it travels between processes.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationName::ChangeImage => "change active image",
        }
    }

    /// Exact, case-sensitive match on the wire name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.as_str() == name)
    }
}

impl fmt::Display for NotificationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
