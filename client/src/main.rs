use clap::Parser;
use log::{info, warn};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tron_client::network::{Client, Steering};
use tron_shared::SERVER_PORT;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, env = "TRON_SERVER", default_value_t = format!("127.0.0.1:{}", SERVER_PORT))]
    server: String,

    /// Steer automatically instead of reading w/a/s/d from stdin
    #[arg(short = 'a', long)]
    autopilot: bool,

    /// Disconnect after this many frames
    #[arg(short = 'f', long)]
    frames: Option<usize>,
}

/// Forwards stdin bytes to the session until stdin closes.
fn spawn_stdin_keys() -> mpsc::Receiver<u8> {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buffer = [0u8; 64];
        loop {
            match stdin.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => {
                    for byte in &buffer[..n] {
                        if tx.send(*byte).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Connecting to: {}", args.server);
    let steering = if args.autopilot {
        info!("Autopilot enabled");
        Steering::Autopilot
    } else {
        info!("Controls: w/a/s/d then Enter to steer");
        Steering::Keys(spawn_stdin_keys())
    };

    let mut client = Client::connect(&args.server, steering)
        .await?
        .with_max_frames(args.frames);

    client.run().await?;
    info!("Session ended: {}", client.state().summary());

    Ok(())
}
