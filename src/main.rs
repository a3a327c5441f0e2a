//! Cogym 批量实验驱动
//!
//! 对 `[start_idx, end_idx)` 中每个数据点写环境配置、启动一组成员进程并等待结束。
//! Ctrl+C / SIGTERM 时清理所有成员进程后以 0 退出；启动阶段失败（如密钥文件缺失）返回非零。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use cogym::config::{load_config, load_team_config, Secrets};
use cogym::core::ShutdownManager;
use cogym::observability;
use cogym::runner::{run_batch, BatchPaths, BatchSettings, BinaryLauncher, SessionRunner, Task};

#[derive(Parser, Debug)]
#[command(name = "cogym", version, about = "Run fully autonomous team experiments")]
struct Args {
    #[arg(long, value_enum)]
    task: Task,

    #[arg(long, default_value = "./workdir")]
    work_dir: PathBuf,

    #[arg(long)]
    start_idx: usize,

    /// 不包含
    #[arg(long)]
    end_idx: usize,

    #[arg(long, default_value = "configs/pure_agent_team_config.toml")]
    team_member_config_path: PathBuf,

    #[arg(long)]
    result_dir_tag: String,

    #[arg(long, default_value = "secrets.toml")]
    secret_path: PathBuf,

    /// 默认使用 `{work_dir}/{task}/{tag}/bus` 下的文件总线
    #[arg(long)]
    message_bus_url: Option<String>,

    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let args = Args::parse();

    let config = load_config(args.config.clone()).context("Failed to load config")?;
    // 成员进程各自读取密钥；这里只在启动前确认文件可用
    Secrets::load(&args.secret_path).context("Failed to load secrets")?;
    let members = load_team_config(&args.team_member_config_path).context("Failed to load team config")?;
    anyhow::ensure!(
        args.start_idx <= args.end_idx,
        "start index {} is after end index {}",
        args.start_idx,
        args.end_idx
    );

    let paths = BatchPaths::new(&args.work_dir, args.task, &args.result_dir_tag);
    let message_bus_url = args
        .message_bus_url
        .clone()
        .unwrap_or_else(|| format!("file://{}", paths.bus_dir().display()));
    let member_binary = match config.runner.member_binary.clone() {
        Some(path) => path,
        None => BinaryLauncher::default_member_binary()?,
    };
    tracing::info!(
        task = args.task.as_str(),
        members = members.len(),
        bus = %message_bus_url,
        binary = %member_binary.display(),
        "Batch configured"
    );

    let launcher = BinaryLauncher {
        member_binary,
        secret_path: args.secret_path.clone(),
        message_bus_url,
        config_path: args.config.clone(),
        env_node_command: config.runner.env_node_command.clone(),
    };
    let runner = SessionRunner::new(Arc::new(launcher), Duration::from_secs(config.runner.kill_grace_secs));
    let settings = BatchSettings {
        task: args.task,
        start_idx: args.start_idx,
        end_idx: args.end_idx,
        members,
        max_steps: config.runner.max_steps,
        disable_collaboration: config.runner.disable_collaboration,
        add_tick: config.runner.add_tick,
    };

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    tokio::select! {
        report = run_batch(&runner, &paths, &settings) => {
            tracing::info!(
                completed = report.completed.len(),
                failed = report.failed.len(),
                "Batch finished"
            );
        }
        _ = shutdown.wait_for_shutdown() => {
            tracing::info!("Shutdown requested, stopping batch");
        }
    }

    runner.cleanup_subprocesses().await;
    Ok(())
}
