use std::io::Write;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod attend;
mod capture;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance system")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the encoding store from the enrollment dataset
    Enroll,
    /// Capture enrollment face images for one person
    Capture {
        /// Person's display name
        #[arg(short, long)]
        name: Option<String>,
        /// Person's id (the attendance dedup key)
        #[arg(short, long)]
        id: Option<String>,
    },
    /// Run the live attendance loop
    Attend {
        /// Lecture/session name; prompted for when omitted
        #[arg(short, long)]
        lecture: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Enroll => run_enroll(&config),
        Commands::Capture { name, id } => capture::run(&config, name, id),
        Commands::Attend { lecture } => attend::run(&config, lecture),
    }
}

fn run_enroll(config: &Config) -> Result<()> {
    let mut extractor = rollcall_core::OnnxExtractor::load(
        &config.detector_model_path(),
        &config.embedder_model_path(),
    )?;

    let store = rollcall_core::enroll::encode_directory(&mut extractor, &config.dataset_dir)?;
    if store.is_empty() {
        tracing::warn!(
            dataset = %config.dataset_dir.display(),
            "no faces enrolled; check the dataset folder layout"
        );
    }
    store.save(&config.store_path)?;

    println!(
        "Enrolled {} entries into {}",
        store.len(),
        config.store_path.display()
    );
    Ok(())
}

/// Read one trimmed line from stdin after printing `label`.
fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
