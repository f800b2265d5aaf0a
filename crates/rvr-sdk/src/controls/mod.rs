//! 高层辅助控制

pub mod infrared;

pub use infrared::{BatchPolicy, DEFAULT_INTER_COMMAND_DELAY, InfraredControl};
