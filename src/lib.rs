// PEGASUSQ: CPU FREQUENCY AND HOTPLUG GOVERNOR
// CONTROL LOGIC ONLY. THE OS IS BEHIND platform::Platform;
// sysfs::SysfsPlatform IS THE LINUX IMPLEMENTATION.

pub mod actuator;
pub mod dvfs;
pub mod error;
pub mod event;
pub mod governor;
pub mod history;
pub mod hotplug;
pub mod load;
pub mod platform;
pub mod runqueue;
pub mod sysfs;
pub mod timer;
pub mod tunables;

pub use error::{GovernorError, Result};
pub use governor::Governor;
pub use platform::{IdleTime, Platform, PowerEvent, Relation};
