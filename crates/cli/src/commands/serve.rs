//! `outreach serve` — Start the HTTP/WebSocket server.

use std::path::Path;

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("✉️  Outreach Gateway");
    println!("   Listening:   {}:{}", config.gateway.host, config.gateway.port);
    println!("   WebSocket:   ws://{}:{}/ws", config.gateway.host, config.gateway.port);
    println!("   Reasoning:   {}", config.reasoning.model);
    println!("   Single-shot: {}", config.single_shot.model);

    outreach_gateway::start(config).await?;

    Ok(())
}
