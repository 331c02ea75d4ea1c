use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use plusminus_web::StaticServer;

/// Serve a PlusMinus checkout over HTTP
#[derive(Parser, Debug)]
#[command(name = "plusminus-serve")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory to serve
    #[arg(long, env = "PLUSMINUS_ROOT", default_value = ".")]
    root: PathBuf,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on (0 = pick a free one)
    #[arg(long, default_value = "0")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let server = StaticServer::new(&args.root)
        .map_err(|e| anyhow::anyhow!("cannot serve {}: {}", args.root.display(), e))?;
    let handle = server.bind(SocketAddr::new(args.host, args.port)).await?;

    info!("Open {}/ in a browser, Ctrl-C to stop", handle.base_url());

    tokio::signal::ctrl_c().await?;
    handle.shutdown().await?;

    Ok(())
}
