//! MCP server initialization for stdio and streamable HTTP transports.

use anyhow::Result;
use rmcp::ServiceExt;

use crate::config::MemoryPilotConfig;
use crate::service::MemoryService;
use crate::tools::MemoryPilotTools;

/// Serve on the transport named in config (`"stdio"` or `"http"`).
pub async fn serve(config: MemoryPilotConfig, transport: Option<&str>) -> Result<()> {
    let transport = transport.unwrap_or(&config.server.transport).to_string();
    match transport.as_str() {
        "stdio" => serve_stdio(config).await,
        "http" => serve_http(config).await,
        other => anyhow::bail!("unknown transport: {other}. Supported: stdio, http"),
    }
}

/// Start the MCP server over stdio.
pub async fn serve_stdio(config: MemoryPilotConfig) -> Result<()> {
    tracing::info!("starting MemoryPilot MCP server on stdio");

    let service = MemoryService::open(config)?;
    let server = MemoryPilotTools::new(service)
        .serve(rmcp::transport::stdio())
        .await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");
    Ok(())
}

/// Start the MCP server over streamable HTTP at `http://host:port/mcp`.
pub async fn serve_http(config: MemoryPilotConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting MemoryPilot MCP server on HTTP");

    let service = MemoryService::open(config)?;
    let http = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(MemoryPilotTools::new(service.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", http);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;
    Ok(())
}
