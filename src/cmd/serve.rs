//! HTTP server command: `storytime serve`.

use anyhow::Result;
use storytime::config::StorytimeConfig;
use storytime::web::{ServerConfig, start_server};

pub async fn cmd_serve(
    config: StorytimeConfig,
    host: Option<String>,
    port: Option<u16>,
    cors: bool,
) -> Result<()> {
    let mut server = ServerConfig::from(&config);
    if let Some(host) = host {
        server.host = host;
    }
    if let Some(port) = port {
        server.port = port;
    }
    server.permissive_cors = cors;
    start_server(server, config).await
}
