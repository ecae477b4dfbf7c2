//! Consolidator CLI - Merge branch attendance workbooks into one report
//!
//! # Main Commands
//!
//! ```bash
//! consolidator run                        # Download configured workbooks and consolidate
//! consolidator consolidate a.xlsx b.xlsx  # Consolidate local workbooks
//! consolidator serve                      # Start HTTP server (port 3000)
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! consolidator validate north.xlsx   # Check one workbook against the layout
//! consolidator extract north.xlsx    # Dump extracted records as JSON
//! consolidator check-config          # Load and check the config file
//! ```

use clap::{Parser, Subcommand};
use consolidator::{
    config::AppConfig,
    extract,
    fetch::{read_local, Downloader},
    logs::{log_warning, LOG_BROADCASTER},
    parser::Workbook,
    run_consolidation,
    server::{start_server, AppState},
    validate, RunOutput,
};
use std::fs;
use std::path::{Path, PathBuf};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "consolidator")]
#[command(about = "Consolidate branch attendance workbooks", long_about = None)]
struct Cli {
    /// Config file (default: $CONSOLIDATOR_CONFIG or config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every configured workbook and consolidate them
    Run,

    /// Consolidate local workbooks
    Consolidate {
        /// Branch workbooks (.xlsx)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Check one workbook against the configured layout
    Validate {
        /// Branch workbook (.xlsx)
        input: PathBuf,
    },

    /// Extract records from one workbook and output JSON
    Extract {
        /// Branch workbook (.xlsx)
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load the config file and show the layout it describes
    CheckConfig,

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match AppConfig::discover(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Run => cmd_run(config).await,
            Commands::Consolidate { files } => cmd_consolidate(config, &files).await,
            Commands::Validate { input } => cmd_validate(&config, &input),
            Commands::Extract { input, output } => cmd_extract(&config, &input, output.as_deref()),
            Commands::CheckConfig => cmd_check_config(&config),
            Commands::Serve { port } => cmd_serve(config, port).await,
        },
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

/// Apply the configured level and open the per-run log file.
fn init_logging(config: &AppConfig, timestamp: &str) {
    LOG_BROADCASTER.set_level(config.log_level());
    if config.logging.file {
        let path = config.log_file(timestamp);
        if let Err(e) = LOG_BROADCASTER.attach_file(&path) {
            log_warning(format!("Cannot open log file {}: {}", path.display(), e));
        }
    }
}

async fn cmd_run(config: AppConfig) -> CliResult {
    let descriptor = config.descriptor()?;
    let timestamp = config.timestamp();
    init_logging(&config, &timestamp);

    if config.excel_urls.is_empty() {
        return Err("no excel_urls configured".into());
    }

    let downloader = Downloader::new(&config.paths.data_dir, &config.fetch, &timestamp)?;
    let sources = downloader.download_all(&config.excel_urls).await;

    let output = tokio::task::spawn_blocking(move || {
        run_consolidation(sources, &descriptor, &config, &timestamp)
    })
    .await??;

    downloader.archive_all(&output.reports);
    print_output(&output);
    Ok(())
}

async fn cmd_consolidate(config: AppConfig, files: &[PathBuf]) -> CliResult {
    let descriptor = config.descriptor()?;
    let timestamp = config.timestamp();
    init_logging(&config, &timestamp);

    let sources = files.iter().map(|path| read_local(path)).collect();

    let output = tokio::task::spawn_blocking(move || {
        run_consolidation(sources, &descriptor, &config, &timestamp)
    })
    .await??;

    print_output(&output);
    Ok(())
}

fn print_output(output: &RunOutput) {
    let summary = &output.summary;
    eprintln!("\n📊 Run {}", summary.run_id);
    eprintln!("   Files:   {} used, {} skipped", summary.files_succeeded, summary.files_skipped);
    for failure in &summary.failures {
        eprintln!(
            "   ❌ {} [{:?}{}]: {}",
            failure.file_id,
            failure.kind,
            failure
                .location
                .as_deref()
                .map(|l| format!(" @ {}", l))
                .unwrap_or_default(),
            failure.message
        );
    }
    eprintln!("   Rows:    {}", summary.groups);
    eprintln!("   💾 {}", output.artifact.display());
}

fn cmd_validate(config: &AppConfig, input: &Path) -> CliResult {
    eprintln!("✔️  Validating: {}", input.display());

    let descriptor = config.descriptor()?;
    let workbook = Workbook::open(input)?;
    let validated = validate(&workbook, &descriptor)?;

    eprintln!("   ✅ Layout OK, branch '{}'", validated.branch);
    Ok(())
}

fn cmd_extract(config: &AppConfig, input: &Path, output: Option<&Path>) -> CliResult {
    eprintln!("📄 Extracting: {}", input.display());

    let descriptor = config.descriptor()?;
    let source = read_local(input)?;
    let batch = extract(&source.bytes, &source.id, &descriptor)?;

    eprintln!("   Branch: {}", batch.branch);
    eprintln!(
        "   Rows {}..{}: {} record(s)",
        batch.data_rows.start,
        batch.data_rows.end,
        batch.records.len()
    );

    let json = serde_json::to_string_pretty(&batch)?;
    write_output(&json, output)?;
    Ok(())
}

fn cmd_check_config(config: &AppConfig) -> CliResult {
    let descriptor = config.descriptor()?;

    eprintln!("✅ Config OK");
    eprintln!("   Sheet:    {}", descriptor.sheet_name());
    eprintln!("   Branch:   {}", descriptor.anchor_cell());
    eprintln!("   Headers:  row {}", descriptor.header_row());
    eprintln!("   Sentinel: column {}", descriptor.sentinel_column());
    for binding in descriptor.columns() {
        eprintln!(
            "   [{}] {} = '{}'",
            binding.column, binding.field, binding.expected_header
        );
    }
    eprintln!("   Sources:  {} URL(s)", config.excel_urls.len());
    eprintln!("   Output:   {}", config.paths.summary_dir.display());
    Ok(())
}

async fn cmd_serve(config: AppConfig, port: u16) -> CliResult {
    let timestamp = config.timestamp();
    init_logging(&config, &timestamp);
    start_server(AppState::new(config)?, port).await
}

fn write_output(content: &str, path: Option<&Path>) -> CliResult {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
