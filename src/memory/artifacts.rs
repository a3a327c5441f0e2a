//! 会话结束产物持久化
//!
//! 每个成员写入 `{result_dir}/{name}/`：info.json（模型 + token 统计）、scratchpad.json（最终笔记）、
//! llm_call_history.jsonl（每次 LLM 调用一行）。

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::llm::{LlmCall, TokenCounts};

pub const INFO_FILE: &str = "info.json";
pub const SCRATCHPAD_FILE: &str = "scratchpad.json";
pub const LLM_HISTORY_FILE: &str = "llm_call_history.jsonl";

/// info.json 内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub lm: String,
    pub token_usage: TokenCounts,
}

/// 单个成员的结果目录
#[derive(Debug)]
pub struct MemberArtifacts {
    dir: PathBuf,
}

impl MemberArtifacts {
    pub fn new(result_dir: impl AsRef<Path>, member_name: &str) -> Self {
        Self {
            dir: result_dir.as_ref().join(member_name),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 写入三个结果文件；目录不存在时自动创建，已存在的文件被覆盖
    pub fn save(&self, info: &MemberInfo, notes: &[String], calls: &[LlmCall]) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.dir.join(INFO_FILE), serde_json::to_string_pretty(info)?)?;
        std::fs::write(
            self.dir.join(SCRATCHPAD_FILE),
            serde_json::to_string_pretty(notes)?,
        )?;

        let mut file = std::io::BufWriter::new(std::fs::File::create(self.dir.join(LLM_HISTORY_FILE))?);
        for call in calls {
            serde_json::to_writer(&mut file, call)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(())
    }

    /// 读回 info.json（测试与汇总脚本使用）
    pub fn load_info(&self) -> anyhow::Result<MemberInfo> {
        let data = std::fs::read_to_string(self.dir.join(INFO_FILE))?;
        Ok(serde_json::from_str(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_writes_three_files() {
        let dir = TempDir::new().unwrap();
        let artifacts = MemberArtifacts::new(dir.path(), "agent_a");
        let info = MemberInfo {
            lm: "mock".into(),
            token_usage: TokenCounts {
                prompt_tokens: 12,
                completion_tokens: 3,
            },
        };
        let calls = vec![
            LlmCall {
                prompt: "p1".into(),
                temperature: 0.0,
                max_tokens: 100,
                response: Some("Plan: 2".into()),
                error: None,
                timestamp: "t".into(),
            },
            LlmCall {
                prompt: "p2\nsecond line".into(),
                temperature: 0.0,
                max_tokens: 4000,
                response: None,
                error: Some("timeout".into()),
                timestamp: "t".into(),
            },
        ];
        artifacts.save(&info, &["note".to_string()], &calls).unwrap();

        assert_eq!(artifacts.load_info().unwrap(), info);
        let notes: Vec<String> =
            serde_json::from_str(&std::fs::read_to_string(artifacts.dir().join(SCRATCHPAD_FILE)).unwrap())
                .unwrap();
        assert_eq!(notes, ["note"]);
        let history = std::fs::read_to_string(artifacts.dir().join(LLM_HISTORY_FILE)).unwrap();
        let lines: Vec<_> = history.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: LlmCall = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.prompt, "p2\nsecond line");
    }

    #[test]
    fn test_empty_history_still_creates_file() {
        let dir = TempDir::new().unwrap();
        let artifacts = MemberArtifacts::new(dir.path(), "b");
        let info = MemberInfo {
            lm: "human".into(),
            token_usage: TokenCounts::default(),
        };
        artifacts.save(&info, &[], &[]).unwrap();
        assert!(artifacts.dir().join(LLM_HISTORY_FILE).exists());
        assert_eq!(
            std::fs::read_to_string(artifacts.dir().join(LLM_HISTORY_FILE)).unwrap(),
            ""
        );
    }
}
