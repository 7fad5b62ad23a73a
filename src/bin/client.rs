use clap::Parser;
use spoker::{FrameError, Message, Opcode, UpgradeError, WebSocketClient};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1")]
    addr: String,

    /// Port to connect to
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Path of the websocket endpoint
    #[arg(long, default_value = "/ws")]
    path: String,

    /// Messages to send, one text frame each
    #[arg(default_values_t = vec!["hello from spoker!".to_string()])]
    messages: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Upgrade(#[from] UpgradeError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
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
    let mut ws = WebSocketClient::connect((args.addr.as_str(), args.port), &args.path).await?;

    let greeting = ws.recv().await?;
    println!("CLI GREETING: {}", String::from_utf8_lossy(&greeting.payload));

    for text in &args.messages {
        ws.send(Message::Text(text.clone()).into()).await?;
        let reply = ws.recv().await?;
        match reply.opcode {
            Opcode::Close => {
                println!("CLI connection closed: {:?}", reply.close_reason());
                return Ok(());
            }
            _ => println!("CLI MESSAGE: {}", String::from_utf8_lossy(&reply.payload)),
        }
    }

    let reason = ws.close().await?;
    println!("CLI closed with {reason:?}");
    Ok(())
}
