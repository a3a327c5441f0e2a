//! 会话编排：成员子进程监管、会话 Runner、批量实验循环

pub mod batch;
pub mod process;
pub mod session;

pub use batch::{run_batch, BatchPaths, BatchReport, BatchSettings, Task};
pub use process::{ExitOutcome, MemberHandle};
pub use session::{BinaryLauncher, MemberLauncher, SessionRunner, SessionSpec};
