//! webpaper entry point.
//!
//! Converts one web article into a PDF. Logging goes to stderr; the written
//! path is printed on stdout.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use webpaper_client::HtmlProvider;
use webpaper_core::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "webpaper")]
#[command(about = "Turn a web article into a clean, printable PDF")]
#[command(version)]
struct Cli {
    /// Article URL
    url: String,

    /// Directory the PDF is written to
    #[arg(default_value = ".")]
    output_dir: PathBuf,

    /// Output file name; derived from the article title when omitted
    #[arg(short, long)]
    filename: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    tracing::info!(url = %cli.url, output_dir = %cli.output_dir.display(), "starting conversion");

    let mut provider = HtmlProvider::from_config(&config)?;
    if !provider.validate(&cli.url).await {
        bail!("{} is not an HTML page", cli.url);
    }

    let path = provider.run(&cli.url, &cli.output_dir, cli.filename.as_deref()).await?;
    println!("{}", path.display());

    Ok(())
}
