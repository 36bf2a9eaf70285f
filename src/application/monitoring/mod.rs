// Supervising scrape/forward loop
pub mod monitor_loop;

pub use monitor_loop::{LoopExit, LoopSettings, LoopState, MonitorLoop};
