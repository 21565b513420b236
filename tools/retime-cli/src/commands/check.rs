//! Check external tool availability.

use retime_common::config::{config_file_path, EngineConfig};
use retime_render_engine::tools::check_tools;

pub async fn run(config: &EngineConfig) -> anyhow::Result<()> {
    println!("Retime System Check");
    println!("{}", "=".repeat(50));
    println!("Config: {}", config_file_path().display());
    println!();

    let tools = check_tools(&config.tools).await;
    for tool in &tools {
        let status = if tool.available() { "[OK]" } else { "[MISSING]" };
        println!("  {} {}: {}", status, tool.name, tool.description);
        if let Some(path) = &tool.path {
            println!("    Path: {}", path.display());
        }
        if let Some(version) = &tool.version {
            println!("    Version: {version}");
        }
        if let Some(fix) = &tool.fix_instructions {
            println!("    Fix: {fix}");
        }
    }

    println!();
    if tools.iter().all(|tool| tool.available()) {
        println!("All required tools are available. Retime is ready.");
    } else {
        println!("Some required tools are missing. See above for fixes.");
    }

    Ok(())
}
