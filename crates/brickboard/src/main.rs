//! brickboard - Usage cohort and sales divergence dashboard

mod cli;

use anyhow::{Context, Result};
use brickboard_core::export::{export_report_to_csv, export_report_to_json};
use brickboard_core::{
    load_datasets, Brand, ConfigLayer, CoreError, DashboardConfig, DashboardReport, DataSource,
    Level, SalesLine, SourceConfig,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "brickboard",
    version,
    about = "Usage cohort and sales divergence dashboard",
    long_about = "Classifies bricks by suggestion usage, compares the sales of high and low\n\
                  usage cohorts around a recommendation date and projects whether they diverge.\n\
                  \n\
                  Examples:\n\
                    brickboard                                   # Report with defaults\n\
                    brickboard --brand forxiga --level brick     # Another brand, coarse units\n\
                    brickboard --data ./data report --json       # Local CSV files, JSON output\n\
                    brickboard export --out reports/             # Write every table as CSV\n\
                    brickboard config                            # Print the resolved configuration\n\
                  \n\
                  Configuration is read from ~/.config/brickboard/config.toml (or --config),\n\
                  then overridden by environment variables and flags.\n\
                  \n\
                  Environment Variables:\n\
                    BRICKBOARD_CONFIG                # Config file path\n\
                    BRICKBOARD_DATA                  # Data directory or http(s) base URL\n\
                    BRICKBOARD_LOG                   # Log filter (e.g. debug, brickboard_core=trace)\n\
                    BRICKBOARD_NO_COLOR              # Disable ANSI colors (log-friendly)"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file (default: ~/.config/brickboard/config.toml)
    #[arg(long, env = "BRICKBOARD_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Data directory or http(s) base URL holding {brand}_{dataset}.csv
    #[arg(long, env = "BRICKBOARD_DATA", global = true)]
    data: Option<String>,

    /// Brand: trixeo|forxiga
    #[arg(long, env = "BRICKBOARD_BRAND", global = true)]
    brand: Option<Brand>,

    /// Usage granularity: mini_brick|brick
    #[arg(long, global = true)]
    level: Option<Level>,

    /// Sales granularity (default: same as --level)
    #[arg(long, global = true)]
    sales_level: Option<Level>,

    /// Sales line: AZ|Santis
    #[arg(long, global = true)]
    sales_line: Option<SalesLine>,

    /// Low usage quantile
    #[arg(long, global = true)]
    quantile_low: Option<f64>,

    /// High usage quantile
    #[arg(long, global = true)]
    quantile_high: Option<f64>,

    /// Minimum usage events before a rate counts
    #[arg(long, global = true)]
    usage_threshold: Option<u32>,

    /// Divergence threshold for the projected cohort gap
    #[arg(long, global = true)]
    reg_threshold: Option<f64>,

    /// Content type counted as usage: VAE|iDetail|none
    #[arg(long, global = true)]
    content_type: Option<String>,

    /// Recommendation date (YYYY-MM-DD)
    #[arg(long, global = true)]
    rec_date: Option<String>,

    /// Rolling mean window in months
    #[arg(long, global = true, value_parser = clap::value_parser!(u8).range(1..=12))]
    window: Option<u8>,

    /// Number of units in the top-N ranking
    #[arg(long, short = 'n', global = true)]
    top_n: Option<usize>,

    /// Months projected past the recommendation date (at most 120)
    #[arg(long, global = true, value_parser = clap::value_parser!(u16).range(0..=120))]
    forecast_horizon: Option<u16>,

    /// Disable ANSI colors (log-friendly)
    #[arg(long, env = "BRICKBOARD_NO_COLOR", global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print the dashboard (default)
    Report {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write every dashboard table to CSV files
    Export {
        /// Output directory
        #[arg(long, short = 'o', default_value = "brickboard-export")]
        out: PathBuf,
        /// Also write report.json
        #[arg(long)]
        json: bool,
    },
    /// Print the resolved configuration as TOML
    Config,
}

impl Cli {
    /// Flags and environment as the top configuration layer
    fn overrides(&self) -> ConfigLayer {
        ConfigLayer {
            brand: self.brand,
            level: self.level,
            sales_level: self.sales_level,
            sales_line: self.sales_line,
            quantile_low: self.quantile_low,
            quantile_high: self.quantile_high,
            usage_threshold: self.usage_threshold,
            reg_threshold: self.reg_threshold,
            content_type: self.content_type.clone(),
            rec_date: self.rec_date.clone(),
            window: self.window.map(usize::from),
            top_n: self.top_n,
            forecast_horizon: self.forecast_horizon.map(usize::from),
            histogram_bins: None,
            data_location: self.data.clone(),
            cache_ttl_secs: None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    if let Err(err) = run(cli).await {
        eprintln!("Error: {:#}", err);
        if let Some(hint) = err.downcast_ref::<CoreError>().and_then(CoreError::suggestion) {
            eprintln!("  💡 {}", hint);
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let (config, source) = resolve_config(&cli)?;
    let no_color = cli.no_color;

    match cli.command.unwrap_or(Command::Report { json: false }) {
        Command::Report { json } => {
            let report = build_report(&config, &source, json).await?;
            println!("{}", cli::format_report(&report, json, no_color));
        }
        Command::Export { out, json } => {
            let report = build_report(&config, &source, false).await?;
            let written = export_report_to_csv(&report, &out)?;
            if json {
                export_report_to_json(&report, &out.join("report.json"))?;
            }
            println!(
                "✓ Exported {} tables to {}",
                written.len(),
                out.display()
            );
        }
        Command::Config => {
            println!("{}", cli::format_config(&config, &source)?);
        }
    }

    Ok(())
}

/// defaults < config file < environment / flags
fn resolve_config(cli: &Cli) -> Result<(DashboardConfig, SourceConfig)> {
    let file_layer = match &cli.config {
        Some(path) => ConfigLayer::load(path)?,
        None => match default_config_path() {
            Some(path) => ConfigLayer::load_optional(&path)?,
            None => ConfigLayer::default(),
        },
    };

    let (config, source) = file_layer.merge(cli.overrides()).resolve()?;
    tracing::debug!(?config, location = %source.location, "Resolved configuration");
    Ok((config, source))
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("brickboard").join("config.toml"))
}

async fn build_report(
    config: &DashboardConfig,
    source: &SourceConfig,
    quiet: bool,
) -> Result<DashboardReport> {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Instant;

    let start = Instant::now();

    // Create spinner
    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .context("Invalid spinner template")?
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));

    spinner.set_message(format!(
        "Loading {} datasets from {}...",
        config.brand, source.location
    ));
    let loader = DataSource::cached(source)?;
    let (usage, sales) = match load_datasets(&loader, config.brand).await {
        Ok(records) => records,
        Err(err) => {
            spinner.finish_and_clear();
            return Err(err.into());
        }
    };

    spinner.set_message("Computing dashboard...");
    let report = match DashboardReport::compute(config, &usage, &sales) {
        Ok(report) => report,
        Err(err) => {
            spinner.finish_and_clear();
            return Err(err.into());
        }
    };

    let elapsed = start.elapsed();
    if quiet {
        spinner.finish_and_clear();
    } else {
        spinner.finish_with_message(format!(
            "✓ Ready in {:.2}s ({} suggestions, {} sales rows)",
            elapsed.as_secs_f64(),
            usage.len(),
            sales.len()
        ));
    }

    Ok(report)
}

fn init_tracing() {
    // Warnings only unless BRICKBOARD_LOG / RUST_LOG say otherwise
    let env_filter = EnvFilter::try_from_env("BRICKBOARD_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .try_init();
}
