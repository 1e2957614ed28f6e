pub mod config;
pub mod ipc;
pub mod taskmgr;

pub use unfilter_updater_lib as updater;
