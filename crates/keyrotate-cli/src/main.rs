mod cli;
mod config;
mod rotate;

use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Entry point: resolve settings, rotate one profile, print the outcome.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load(cli.config.as_deref())?;
    let settings = config::resolve(&cli, &config)?;

    let report = rotate::run(&settings).await?;
    println!("{}", rotate::summary(&report));
    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info; logs go to stderr so stdout stays the summary.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
