//! reelfill CLI: resumable TMDB enrichment of a MovieLens catalog.
//!
//! Reads the local links and ratings tables, fetches detail and cast for
//! every movie not yet in the checkpoint, and persists the results.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
