use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};

use tradeline_pipeline::config::Config;
use tradeline_pipeline::extract::PlainTextExtractor;
use tradeline_pipeline::logging;
use tradeline_pipeline::pipeline::{CancellationToken, PipelineOrchestrator};
use tradeline_pipeline::storage::InMemoryStorage;

#[derive(Parser)]
#[command(name = "tradeline-pipeline")]
#[command(about = "Credit-report tradeline extraction and reconciliation pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline over an extracted-text report file
    Process {
        /// Path to the report text file
        file: String,
        /// User the records belong to
        #[arg(long, default_value = "local")]
        user: String,
        /// Parse and validate without handing records to storage
        #[arg(long)]
        no_store: bool,
    },
    /// Pre-flight check a report file without processing it
    Validate {
        /// Path to the report text file
        file: String,
    },
    /// Print configured limits and component identifiers
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load()?;
    let storage = Arc::new(InMemoryStorage::new());
    let orchestrator =
        PipelineOrchestrator::new(config, Arc::new(PlainTextExtractor), storage);

    match cli.command {
        Commands::Process {
            file,
            user,
            no_store,
        } => {
            info!("processing report file {}", file);
            let token = CancellationToken::new();
            let result = orchestrator.run(&file, &user, !no_store, &token).await;

            println!("\n📊 Pipeline Results (run {}):", result.run_id);
            println!("   Parsed:  {}", result.parsed_count);
            println!("   Valid:   {}", result.valid_count);
            println!("   Invalid: {}", result.invalid_count);
            println!("   New:     {}", result.new_count);
            println!("   Merged:  {}", result.merged_count);
            println!("   Stored:  {}", result.stored_count);
            println!("   Took:    {}ms", result.duration_ms);

            if !result.warnings.is_empty() {
                println!("\n⚠️  Warnings:");
                for warning in &result.warnings {
                    println!("   - {}", warning);
                }
            }
            if let Some(err) = &result.error {
                error!("pipeline failed: {}", err);
                println!("\n❌ Failed: {}", err);
            } else if result.success {
                println!("\n✅ Success");
            } else {
                println!("\n❌ Run completed without storable records");
            }
        }
        Commands::Validate { file } => {
            let preflight = orchestrator.validate_only(&file).await;
            if let Some(info) = &preflight.file_info {
                println!(
                    "📄 {} ({} bytes, {} page(s))",
                    info.name, info.size_bytes, info.page_count
                );
            }
            for warning in &preflight.warnings {
                println!("⚠️  {}", warning);
            }
            for err in &preflight.errors {
                println!("❌ {}", err);
            }
            println!(
                "{}",
                if preflight.valid {
                    "✅ Source looks processable"
                } else {
                    "❌ Source failed pre-flight checks"
                }
            );
        }
        Commands::Stats => {
            let stats = orchestrator.statistics();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
