use std::path::PathBuf;
use clap::{Parser, Subcommand};
use serde_json::Value;

use uptime_results::config::loader::load_config;
use uptime_results::config::PipelineConfig;
use uptime_results::consumer::StreamMessage;
use uptime_results::uptime::issues::fingerprint_for_binding;

#[derive(Parser)]
#[command(name = "uptime-cli")]
#[command(about = "Operator tooling for the uptime results pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a config file and print the effective settings
    CheckConfig { path: PathBuf },
    /// Print the default configuration as TOML
    Defaults,
    /// Print the issue fingerprint of a binding
    Fingerprint { binding_id: u64 },
    /// Decode a check result payload and print it normalized
    Decode { payload: String },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::CheckConfig { path } => match load_config(&path) {
            Ok(config) => {
                let regions: Vec<&str> = config.enabled_regions().map(|r| r.slug.as_str()).collect();
                println!("config ok: {}", path.display());
                println!("  mode:            {:?}", config.consumer.mode);
                println!("  enabled regions: {}", regions.join(", "));
                println!("  create issues:   {}", config.issues.create_issues);
                println!("  analytics topic: {}", config.analytics.topic);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        Commands::Defaults => {
            print!("{}", toml::to_string_pretty(&PipelineConfig::default())?);
        }
        Commands::Fingerprint { binding_id } => {
            println!("{}", fingerprint_for_binding(binding_id));
        }
        Commands::Decode { payload } => {
            let result = StreamMessage::new(0, 0, payload).decode()?;
            let json: Value = serde_json::to_value(&result)?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    Ok(())
}
