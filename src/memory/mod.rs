//! 记忆层：暂存区、共享对话历史、会话结束产物

pub mod artifacts;
pub mod chat;
pub mod scratchpad;

pub use artifacts::{MemberArtifacts, MemberInfo, INFO_FILE, LLM_HISTORY_FILE, SCRATCHPAD_FILE};
pub use chat::{formatted_local_time, ChatHistory, ChatTurn};
pub use scratchpad::Scratchpad;
