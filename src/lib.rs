//! Cogym - 多成员协作会话编排
//!
//! 模块划分：
//! - **config**: 应用配置（TOML + 环境变量）、团队成员、密钥、环境配置文件
//! - **core**: 错误分类、关闭信号、Runner 状态机
//! - **bus**: 会话消息总线（进程内 / 文件）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）、调用记录
//! - **memory**: 暂存区、对话历史、结果文件
//! - **react**: 输出解析与清洗、prompt 模板、回合决策状态机
//! - **node**: 成员与环境节点的总线循环
//! - **runner**: 成员子进程监管、会话 Runner、批量实验
//! - **observability**: tracing 初始化

pub mod bus;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod node;
pub mod observability;
pub mod react;
pub mod runner;
