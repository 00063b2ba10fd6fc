//! `outreach doctor` — Diagnose configuration and connectivity.

use std::path::Path;
use std::sync::Arc;

use outreach_config::{AppConfig, DEFAULT_CONFIG_FILE};
use outreach_tools::{McpToolProvider, ToolRegistry};

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Outreach Doctor — Setup Diagnostics");
    println!("======================================\n");

    let mut issues = 0;

    let shown_path = config_path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
    if shown_path.exists() {
        println!("  ✅ Config file found: {}", shown_path.display());
    } else {
        println!("  ⚠️  No config file at {}, using defaults", shown_path.display());
    }

    let config = match AppConfig::load(config_path) {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. Fix the configuration first.");
            return Ok(());
        }
    };

    // Model credential
    match outreach_providers::build_from_config(&config) {
        Ok(provider) => {
            println!("  ✅ Anthropic API key configured");
            match provider.health_check().await {
                Ok(true) => println!("  ✅ Anthropic API reachable"),
                Ok(false) => {
                    println!("  ⚠️  Anthropic API did not report healthy");
                    issues += 1;
                }
                Err(e) => {
                    println!("  ❌ Anthropic API check failed: {e}");
                    issues += 1;
                }
            }
        }
        Err(_) => {
            println!("  ❌ No Anthropic API key — set ANTHROPIC_API_KEY or [anthropic].api_key");
            issues += 1;
        }
    }

    // Tool server
    match McpToolProvider::from_config(&config.tools) {
        Ok(provider) => {
            let endpoint = provider.endpoint().to_string();
            println!("  ✅ Tool server configured: {endpoint}");
            if !config.tools.headers.contains_key("Authorization") {
                println!("  ⚠️  No Authorization header for the tool server (OUTREACH_MCP_TOKEN)");
            }
            match ToolRegistry::connect(Arc::new(provider)).await {
                Ok(registry) => {
                    println!("  ✅ Tool server reachable, {} tool(s) available", registry.len());
                    for name in registry.names() {
                        println!("       • {name}");
                    }
                    if registry.is_empty() {
                        println!("  ⚠️  The tool server advertises no tools");
                        issues += 1;
                    }
                }
                Err(e) => {
                    println!("  ❌ Could not list tools at {endpoint}: {e}");
                    issues += 1;
                }
            }
        }
        Err(_) => {
            println!("  ❌ No tool server — set OUTREACH_MCP_URL or [tools].mcp_url");
            issues += 1;
        }
    }

    println!(
        "  ℹ️  Reasoning: {} (max {} steps), single-shot: {}",
        config.reasoning.model, config.agent.max_steps, config.single_shot.model
    );

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
