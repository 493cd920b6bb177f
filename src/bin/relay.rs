use chatwire::relay::RelayServer;
use chrono::Utc;
use clap::Parser;
use log::{error, info};

/// Stateless fan-out relay for chatwire clients.
#[derive(Parser, Debug)]
#[command(name = "chatwire-relay", version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:4880")]
    listen: String,
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Utc::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    rt.block_on(async {
        let relay = match RelayServer::bind(&args.listen).await {
            Ok(relay) => relay,
            Err(e) => {
                error!("Failed to bind {}: {}", args.listen, e);
                return;
            }
        };

        tokio::select! {
            result = relay.run() => {
                if let Err(e) = result {
                    error!("Relay stopped with error: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down.");
            }
        }
    });
}
