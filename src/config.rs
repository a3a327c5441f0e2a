//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `COGYM__*` 覆盖（双下划线表示嵌套，如 `COGYM__AGENT__IDLE_TIMEOUT_SECS=2`）。
//! 另含三类独立文件：团队成员配置（`[[team_member]]`）、密钥文件、单次会话的环境配置。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::RunnerError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub runner: RunnerSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub llm: LlmSection,
}

/// [runner] 段：会话步数上限、协作开关、子进程终止宽限
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSection {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_disable_collaboration")]
    pub disable_collaboration: bool,
    #[serde(default)]
    pub add_tick: bool,
    /// SIGTERM 后等待多少秒再 SIGKILL
    #[serde(default = "default_kill_grace_secs")]
    pub kill_grace_secs: u64,
    /// 成员进程可执行文件；未设置时取当前可执行文件同目录下的 cogym-member
    pub member_binary: Option<PathBuf>,
    /// 可选：外部环境节点命令（会追加 --session-id / --env-config-path 等参数）
    pub env_node_command: Option<Vec<String>>,
}

fn default_max_steps() -> usize {
    30
}

fn default_disable_collaboration() -> bool {
    true
}

fn default_kill_grace_secs() -> u64 {
    5
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            disable_collaboration: default_disable_collaboration(),
            add_tick: false,
            kill_grace_secs: default_kill_grace_secs(),
            member_binary: None,
            env_node_command: None,
        }
    }
}

/// [agent] 段：提示词目录、各阶段 token 预算、示例开关、空闲超时
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    pub prompt_dir: Option<PathBuf>,
    #[serde(default = "default_large_budget")]
    pub update_max_tokens: u32,
    #[serde(default = "default_plan_max_tokens")]
    pub plan_max_tokens: u32,
    #[serde(default = "default_large_budget")]
    pub message_max_tokens: u32,
    #[serde(default = "default_large_budget")]
    pub act_max_tokens: u32,
    #[serde(default = "default_true")]
    pub add_plan_demo: bool,
    #[serde(default = "default_true")]
    pub add_task_demo: bool,
    /// 总线上连续多少秒没有事件就结束本成员进程
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_large_budget() -> u32 {
    4000
}

fn default_plan_max_tokens() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

fn default_idle_timeout_secs() -> u64 {
    600
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            prompt_dir: None,
            update_max_tokens: default_large_budget(),
            plan_max_tokens: default_plan_max_tokens(),
            message_max_tokens: default_large_budget(),
            act_max_tokens: default_large_budget(),
            add_plan_demo: true,
            add_task_demo: true,
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock；未设置时按模型名推断
    pub provider: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 COGYM__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 COGYM__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("COGYM")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 团队成员角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Agent,
    Human,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Agent => "agent",
            MemberRole::Human => "human",
        }
    }
}

/// 单个团队成员的启动参数；会话开始后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMemberConfig {
    pub name: String,
    #[serde(default = "default_role", alias = "type")]
    pub role: MemberRole,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// 自建 / 兼容端点，未设置时用 [llm].base_url 或官方端点
    pub lm_url: Option<String>,
    /// 收到观测后等待多少秒再行动（与人类协作时合并连续观测）
    #[serde(default = "default_wait_time")]
    pub wait_time: u64,
}

fn default_role() -> MemberRole {
    MemberRole::Agent
}

fn default_model_name() -> String {
    "gpt-4o-2024-08-06".to_string()
}

fn default_wait_time() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
struct TeamConfigFile {
    #[serde(default)]
    team_member: Vec<TeamMemberConfig>,
}

/// 读取团队成员配置（`[[team_member]]` 数组）；为空视为配置错误
pub fn load_team_config(path: &Path) -> Result<Vec<TeamMemberConfig>, RunnerError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| RunnerError::Config(format!("read {}: {}", path.display(), e)))?;
    let parsed: TeamConfigFile = toml::from_str(&raw)
        .map_err(|e| RunnerError::Config(format!("parse {}: {}", path.display(), e)))?;
    if parsed.team_member.is_empty() {
        return Err(RunnerError::Config(format!(
            "{} defines no [[team_member]]",
            path.display()
        )));
    }
    Ok(parsed.team_member)
}

/// 密钥：显式结构体，按值传给 LLM 构造函数，不写入进程环境变量
#[derive(Clone, Default)]
pub struct Secrets {
    values: BTreeMap<String, String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Secrets {
    pub fn from_map(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// 读取扁平 TOML 字符串表；文件缺失或格式错误均为启动失败
    pub fn load(path: &Path) -> Result<Self, RunnerError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RunnerError::Config(format!("read secrets {}: {}", path.display(), e)))?;
        let table: toml::Table = toml::from_str(&raw)
            .map_err(|e| RunnerError::Config(format!("parse secrets {}: {}", path.display(), e)))?;
        let values = table
            .into_iter()
            .filter_map(|(k, v)| match v {
                toml::Value::String(s) => Some((k, s)),
                _ => None,
            })
            .collect();
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// 单次会话的环境配置文件：`env_class` + `[env_args]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    pub env_class: String,
    #[serde(default)]
    pub env_args: toml::Table,
}

impl EnvConfig {
    pub fn write(&self, path: &Path) -> Result<(), RunnerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RunnerError::Config(format!("create {}: {}", parent.display(), e)))?;
        }
        let body = toml::to_string(self)
            .map_err(|e| RunnerError::Config(format!("serialize env config: {}", e)))?;
        std::fs::write(path, body)
            .map_err(|e| RunnerError::Config(format!("write {}: {}", path.display(), e)))
    }

    pub fn read(path: &Path) -> Result<Self, RunnerError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RunnerError::Config(format!("read {}: {}", path.display(), e)))?;
        toml::from_str(&raw).map_err(|e| RunnerError::Config(format!("parse {}: {}", path.display(), e)))
    }
}
