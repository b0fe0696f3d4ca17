use anyhow::{Context, Result};
use clap::Parser;
use hlm_rs::pipeline::{self, PipelineConfig};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "hlm-rs",
    version,
    about = "Hierarchical linear models of congressional votes on tobacco legislation"
)]
struct Cli {
    #[arg(long, default_value = "tobacco.dta", help = "Stata .dta file to analyse")]
    data: PathBuf,
    #[arg(long, default_value = "plots", help = "Directory the SVG plots are written to")]
    output_dir: PathBuf,
    #[arg(long, default_value_t = false, help = "Skip rendering plots")]
    no_plots: bool,
    #[arg(
        long,
        default_value_t = 3,
        help = "Index of the ladder model used for diagnostics (0 = null model)"
    )]
    diagnose: usize,
    #[arg(long, default_value_t = 6, help = "Rows shown in the data preview")]
    head: usize,
    #[arg(long, default_value_t = 0.95, help = "Confidence level for intervals")]
    confidence_level: f64,
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "More log output (-v info, -vv debug)"
    )]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "hlm_rs=info",
        _ => "hlm_rs=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = PipelineConfig {
        data_path: cli.data,
        output_dir: cli.output_dir,
        plots: !cli.no_plots,
        diagnose: cli.diagnose,
        head: cli.head,
        confidence_level: cli.confidence_level,
    };

    config.validate().context("checking the settings")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let dataset = pipeline::load(&config)
        .with_context(|| format!("loading {}", config.data_path.display()))?;
    pipeline::summarize(&dataset, &config, &mut out).context("describing the data")?;
    pipeline::visualize(&dataset, &config).context("plotting the data")?;
    let fits =
        pipeline::fit_models(&dataset, &config, &mut out).context("fitting the model ladder")?;
    pipeline::compare_engines(&fits, config.diagnose, &config, &mut out)
        .context("refitting with the EM engine")?;
    pipeline::diagnose(&fits, &config, &mut out).context("computing diagnostics")?;

    out.flush().context("flushing the report")?;
    Ok(())
}
