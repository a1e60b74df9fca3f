//! Simple AirTunes receiver
//!
//! `cargo run --example receiver --features audio-cpal -- "Kitchen" key.pem`
//!
//! Without a key file a fresh one is generated; senders that check the
//! `Apple-Response` will then refuse to stream.

use raop_receiver::{RaopReceiver, ReceiverConfig, ReceiverEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("raop_receiver=info".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let name = args.next().unwrap_or_else(|| "Rust AirTunes".to_string());

    let mut config = ReceiverConfig::with_name(name);
    if let Some(path) = args.next() {
        config = config.private_key_file(path)?;
    }

    let mut receiver = RaopReceiver::new(config);
    let track = receiver.current_track();

    // Handle events
    let mut events = receiver.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ReceiverEvent::Started { name, port } => {
                    println!("Receiver '{name}' started on port {port}");
                }
                ReceiverEvent::ClientConnected { address } => {
                    println!("Client connected from {address}");
                }
                ReceiverEvent::StreamStarted { .. } => {
                    println!("Playback started!");
                    if let Some(info) = track.get() {
                        println!(
                            "Now playing: {} - {}",
                            info.artist.as_deref().unwrap_or("?"),
                            info.title.as_deref().unwrap_or("?")
                        );
                    }
                }
                ReceiverEvent::VolumeChanged { db } => {
                    println!("Volume: {db:.1} dB");
                }
                ReceiverEvent::PacketsAbandoned { sequences } => {
                    println!("Lost {} packet(s)", sequences.len());
                }
                ReceiverEvent::Stopped => {
                    println!("Receiver stopped.");
                    break;
                }
                _ => {}
            }
        }
    });

    // Start receiver
    receiver.start().await?;
    println!("Receiver running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    receiver.stop().await?;

    Ok(())
}
