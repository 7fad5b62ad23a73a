use std::path::PathBuf;

use clap::Parser;
use spoker::{DEFAULT_GREETING, ServerConfig, ServerError, WebSocketServer};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1")]
    addr: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Directory holding index.html and the files served under /static/
    #[arg(short, long, default_value = "static")]
    static_dir: PathBuf,

    /// Text sent to every client right after the upgrade
    #[arg(short, long, default_value = DEFAULT_GREETING)]
    greeting: String,
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                "spoker=info"
                    .parse()
                    .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
            ),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let config = ServerConfig {
        addr: args.addr,
        port: args.port,
        static_dir: args.static_dir,
        greeting: args.greeting,
        ..ServerConfig::default()
    };

    let server = WebSocketServer::bind(config).await?;
    tokio::select! {
        () = server.run() => {}
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("shutting down");
        }
    }

    Ok(())
}
