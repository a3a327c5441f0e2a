//! 批量实验：对 `[start_idx, end_idx)` 中每个数据点跑一个会话
//!
//! 每个编号：写环境配置 → reset → start_session → 等待全部进程退出 → 记录耗时。
//! 单个会话失败只记录日志，不中断后续编号。

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::ValueEnum;

use crate::config::{EnvConfig, TeamMemberConfig};
use crate::core::RunnerError;
use crate::runner::session::{SessionRunner, SessionSpec};

/// 支持的任务
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum Task {
    RelatedWork,
    TabularAnalysis,
    TravelPlanning,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::RelatedWork => "related_work",
            Task::TabularAnalysis => "tabular_analysis",
            Task::TravelPlanning => "travel_planning",
        }
    }

    /// 环境节点识别的环境类名
    pub fn env_class(&self) -> &'static str {
        match self {
            Task::RelatedWork => "lit_survey",
            Task::TabularAnalysis => "tabular_analysis",
            Task::TravelPlanning => "travel_planning",
        }
    }

    /// 数据点编号在 env_args 中的键名
    fn index_key(&self) -> &'static str {
        match self {
            Task::RelatedWork => "data_point_idx",
            Task::TabularAnalysis => "discovery_bench_data_point_idx",
            Task::TravelPlanning => "travel_planner_data_point_idx",
        }
    }

    pub fn env_config(&self, idx: usize) -> EnvConfig {
        let mut env_args = toml::Table::new();
        env_args.insert("use_simulated_dataset".into(), toml::Value::Boolean(true));
        env_args.insert(self.index_key().into(), toml::Value::Integer(idx as i64));
        EnvConfig {
            env_class: self.env_class().to_string(),
            env_args,
        }
    }

    pub fn session_id(&self, idx: usize) -> String {
        format!("{}_{}", self.as_str(), idx)
    }
}

/// `{work_dir}/{task}/{tag}` 下的目录布局
#[derive(Debug, Clone)]
pub struct BatchPaths {
    task: Task,
    root: PathBuf,
}

impl BatchPaths {
    pub fn new(work_dir: &Path, task: Task, tag: &str) -> Self {
        Self {
            task,
            root: work_dir.join(task.as_str()).join(tag),
        }
    }

    pub fn env_config_path(&self, idx: usize) -> PathBuf {
        self.root
            .join("env_config_tmp")
            .join(format!("{}.toml", self.task.session_id(idx)))
    }

    pub fn result_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    /// 未指定总线地址时使用的文件总线目录
    pub fn bus_dir(&self) -> PathBuf {
        self.root.join("bus")
    }
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub task: Task,
    pub start_idx: usize,
    pub end_idx: usize,
    pub members: Vec<TeamMemberConfig>,
    pub max_steps: usize,
    pub disable_collaboration: bool,
    pub add_tick: bool,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub completed: Vec<usize>,
    pub failed: Vec<(usize, String)>,
}

async fn run_one(
    runner: &SessionRunner,
    paths: &BatchPaths,
    settings: &BatchSettings,
    idx: usize,
) -> Result<(), RunnerError> {
    let env_config_path = paths.env_config_path(idx);
    settings.task.env_config(idx).write(&env_config_path)?;

    runner.reset();
    let spec = SessionSpec {
        session_id: settings.task.session_id(idx),
        env_config_path,
        result_dir: paths.result_dir(),
        members: settings.members.clone(),
        max_steps: settings.max_steps,
        disable_collaboration: settings.disable_collaboration,
        add_tick: settings.add_tick,
    };
    runner.start_session(&spec)?;

    for (member, outcome) in runner.wait_all().await {
        if !outcome.is_success() {
            tracing::warn!(session_id = %spec.session_id, %member, ?outcome, "member exited abnormally");
        }
    }
    Ok(())
}

pub async fn run_batch(runner: &SessionRunner, paths: &BatchPaths, settings: &BatchSettings) -> BatchReport {
    let mut report = BatchReport::default();
    for idx in settings.start_idx..settings.end_idx {
        let started = Instant::now();
        tracing::info!(task = settings.task.as_str(), idx, "Starting experiment");

        match run_one(runner, paths, settings, idx).await {
            Ok(()) => {
                let minutes = started.elapsed().as_secs_f64() / 60.0;
                tracing::info!(
                    task = settings.task.as_str(),
                    idx,
                    "Experiment completed in {:.2} minutes",
                    minutes
                );
                report.completed.push(idx);
            }
            Err(e) => {
                tracing::error!(task = settings.task.as_str(), idx, error = %e, "Experiment failed, continuing");
                report.failed.push((idx, e.to_string()));
            }
        }
    }
    report
}
