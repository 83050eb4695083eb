use market_server::{Config, Server, ServerState, print_banner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 环境变量 (.env 可选)
    dotenv::dotenv().ok();

    // 2. 日志
    let log_level = std::env::var("LOG_LEVEL").ok();
    market_server::init_logger_with_file(log_level.as_deref(), None);

    print_banner();
    tracing::info!("Mercat market server starting...");

    // 3. 加载配置
    let config = Config::from_env();

    // 4. 初始化服务器状态
    let state = ServerState::initialize(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Initialization failed: {e}"))?;

    // 5. 启动 HTTP 服务器
    let server = Server::with_state(config, state);
    server
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {e}"))?;

    Ok(())
}
