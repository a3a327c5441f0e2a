//! 团队成员进程：由批量驱动为每个成员启动一个
//!
//! Agent 成员跑回合决策循环，人类成员转发前端输入。
//! 任一退出路径（会话结束、步数用尽、空闲超时、SIGINT/SIGTERM）都先落盘结果文件再以 0 退出。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use cogym::bus;
use cogym::config::{load_config, MemberRole, Secrets, TeamMemberConfig};
use cogym::core::ShutdownManager;
use cogym::llm::{create_llm_client, RecordingLlmClient};
use cogym::node::{AgentMember, HumanMember, MemberOptions};
use cogym::observability;
use cogym::react::{AgentSettings, CollaborativeAgent, PromptTemplates};

#[derive(Parser, Debug)]
#[command(name = "cogym-member", version, about = "Run one team member of a session")]
struct Args {
    #[arg(long)]
    name: String,

    #[arg(long)]
    session_id: String,

    #[arg(long, value_enum, default_value = "agent")]
    role: MemberRole,

    #[arg(long, default_value = "gpt-4o-2024-08-06")]
    model_name: String,

    #[arg(long)]
    lm_url: Option<String>,

    /// 收到观测后等待的秒数
    #[arg(long, default_value_t = 5)]
    wait_time: u64,

    #[arg(long, default_value_t = 30)]
    max_steps: usize,

    #[arg(long)]
    result_dir: PathBuf,

    #[arg(long, default_value = "secrets.toml")]
    secret_path: PathBuf,

    #[arg(long)]
    message_bus_url: String,

    #[arg(long)]
    disable_collaboration: bool,

    #[arg(long)]
    add_tick: bool,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let args = Args::parse();

    let config = load_config(args.config.clone()).context("Failed to load config")?;
    let bus = bus::connect(&args.message_bus_url).context("Failed to connect message bus")?;

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let options = MemberOptions {
        name: args.name.clone(),
        session_id: args.session_id.clone(),
        wait_time: Duration::from_secs(args.wait_time),
        max_steps: args.max_steps,
        add_tick: args.add_tick,
        idle_timeout: Duration::from_secs(config.agent.idle_timeout_secs),
        result_dir: args.result_dir.clone(),
    };

    let reason = match args.role {
        MemberRole::Human => HumanMember::new(options, bus).run(shutdown.token()).await?,
        MemberRole::Agent => {
            let secrets = Secrets::load(&args.secret_path).context("Failed to load secrets")?;
            let member = TeamMemberConfig {
                name: args.name.clone(),
                role: MemberRole::Agent,
                model_name: args.model_name.clone(),
                lm_url: args.lm_url.clone(),
                wait_time: args.wait_time,
            };
            let client = create_llm_client(&member, &config.llm, &secrets).context("Failed to create LLM client")?;
            let llm = Arc::new(RecordingLlmClient::new(client, config.llm.timeouts.request));
            let templates = PromptTemplates::load(config.agent.prompt_dir.as_deref());
            let settings = AgentSettings::from_section(&config.agent, args.disable_collaboration);
            let agent = CollaborativeAgent::new(llm, &templates, settings);
            AgentMember::new(options, agent, bus).run(shutdown.token()).await?
        }
    };

    tracing::info!(member = %args.name, ?reason, "member finished");
    Ok(())
}
