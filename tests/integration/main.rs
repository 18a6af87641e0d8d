// 集成测试入口

use std::sync::Once;

mod save_tests;

static LOG_INIT: Once = Once::new();

/// 设置 RUST_LOG 可查看引擎日志，便于排查测试失败
pub fn init_logging() {
    LOG_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}
