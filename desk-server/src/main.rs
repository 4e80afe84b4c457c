use desk_server::{BackgroundTasks, Config, ServerState, print_banner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    desk_server::init_logger_with_file(Some(&config.log_level), config.log_dir.as_deref());

    print_banner();
    tracing::info!("Desk server starting...");

    let state = ServerState::initialize(&config).await?;

    let mut tasks = BackgroundTasks::new();
    state.start_background_tasks(&mut tasks);
    tracing::info!("Background tasks registered: {}", tasks.len());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    tasks.shutdown().await;
    Ok(())
}
