use clap::Parser;
use tcpchat::{chat, ChatState, Cli, Connect, EventBus, MemoryStore};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let config = Cli::parse().into_config()?;
    tcpchat::logging::init(config.env)?;

    tracing::info!(
        addr = %config.addr,
        timeout_ms = config.timeout,
        max_connections = ?config.max_connections,
        max_frame_len = config.max_frame_len,
        env = ?config.env,
        "configuration loaded"
    );

    let state = ChatState::new(MemoryStore::new(), EventBus::new()).with_buffer(config.chat_buffer);
    let mux = chat::mux(state, config.request_timeout());

    let shutdown = config.server().serve(mux).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!(
        active_connections = shutdown.active_connections(),
        "shutting down"
    );
    shutdown.shutdown().await;

    tracing::info!("shutdown complete");
    Ok(())
}
