//! 核心层：错误类型、Runner 状态机、优雅关闭

pub mod error;
pub mod shutdown;
pub mod state;

pub use error::RunnerError;
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::{RunnerEvent, RunnerState};
