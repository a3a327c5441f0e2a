//! 可观测性：tracing 订阅者初始化（两个可执行文件共用）
//!
//! 默认 info 级别，`RUST_LOG` 覆盖。日志写到 stderr，成员进程的输出与批量驱动交织在同一终端。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // 重复初始化（例如测试中）时保留已有订阅者
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
