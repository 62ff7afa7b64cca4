//! framecast render server — entry point.
//!
//! ```text
//! framecast-server                   Run with framecast-server.toml (or defaults)
//! framecast-server --config <path>   Load a custom config TOML
//! framecast-server --gen-config      Write default config to stdout
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use socket2::SockRef;
use tokio::net::UdpSocket;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use framecast_core::{RenderServer, TestPatternRenderer};
use framecast_server::config::ServerConfig;

/// DSCP CS6 in the IPv4 TOS byte.
const DSCP_CS6: u32 = 0xC0;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "framecast-server", about = "framecast render server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "framecast-server.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = ServerConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("framecast-server v{}", env!("CARGO_PKG_VERSION"));
    info!("listen port: {}", config.network.listen_port);

    let bind = SocketAddr::new(
        IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        config.network.listen_port,
    );
    let socket = UdpSocket::bind(bind).await?;
    if let Err(e) = SockRef::from(&socket).set_tos_v4(DSCP_CS6) {
        debug!("failed to set DSCP/TOS: {e}");
    }
    info!("bound {bind}");

    let server = RenderServer::with_config(socket, config.to_pipeline_config());
    let token = server.cancel_token();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received — shutting down");
        token.cancel();
    });

    server.run(TestPatternRenderer).await?;
    info!("render server stopped");

    Ok(())
}
