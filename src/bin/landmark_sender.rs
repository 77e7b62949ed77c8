use anyhow::{Context, Result};
use std::time::Duration;

use avatar_retarget::config::Config;
use avatar_retarget::protocol::{self, ClientMessage, LandmarkRecord, MessageStream, ServerMessage};

const CONFIG_PATH: &str = "config.toml";

struct Args {
    recording: String,
    server_addr: Option<String>,
    repeat: bool,
}

fn parse_args() -> Option<Args> {
    // Usage: landmark_sender <recording.jsonl> [server_addr] [--loop]
    let args: Vec<String> = std::env::args().skip(1).collect();
    let repeat = args.iter().any(|a| a == "--loop");
    let mut positional = args.into_iter().filter(|a| !a.starts_with("--"));
    Some(Args {
        recording: positional.next()?,
        server_addr: positional.next(),
        repeat,
    })
}

/// 記録時のタイムスタンプ間隔で送る
async fn replay(stream: &mut MessageStream, records: &[LandmarkRecord]) -> Result<()> {
    let mut previous: Option<u64> = None;
    for record in records {
        if let Some(prev) = previous {
            let wait = record.timestamp_us.saturating_sub(prev);
            if wait > 0 {
                tokio::time::sleep(Duration::from_micros(wait)).await;
            }
        }
        previous = Some(record.timestamp_us);
        protocol::send_message(stream, &ClientMessage::from(record.clone())).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(args) = parse_args() else {
        eprintln!("Usage: landmark_sender <recording.jsonl> [server_addr] [--loop]");
        std::process::exit(2);
    };
    let config = Config::load_or_default(CONFIG_PATH);
    let server_addr = args.server_addr.unwrap_or_else(|| config.server.listen_addr.replace("0.0.0.0", "127.0.0.1"));

    let text = std::fs::read_to_string(&args.recording)
        .with_context(|| format!("failed to read {}", args.recording))?;
    let records = protocol::parse_recording(&text)?;
    println!("Landmark Sender ({})", env!("GIT_VERSION"));
    println!("Recording: {} ({} records)", args.recording, records.len());
    println!("Server: {}", server_addr);

    let tcp = tokio::net::TcpStream::connect(&server_addr)
        .await
        .with_context(|| format!("failed to connect to {}", server_addr))?;
    tcp.set_nodelay(true)?;
    let mut stream = protocol::message_stream(tcp);

    // リグのキャリブレーションを要求してから送り始める
    protocol::send_message(&mut stream, &ClientMessage::AssetLoaded).await?;
    match protocol::recv_message::<ServerMessage>(&mut stream).await? {
        ServerMessage::Ready => log::info!("server: ready"),
        ServerMessage::CalibrationFailed => anyhow::bail!("server could not calibrate the rig"),
        other => anyhow::bail!("unexpected reply: {:?}", other),
    }

    loop {
        replay(&mut stream, &records).await?;
        if !args.repeat {
            break;
        }
    }

    println!("Done");
    Ok(())
}
