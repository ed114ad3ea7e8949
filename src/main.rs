mod app;
mod client;
mod codegen;
mod config;
mod console;
mod persist;
mod protocol;
mod request;
mod response;
mod state;
mod target;

use clap::Parser;
use color_eyre::{Result, eyre::eyre};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing()?;

    let config = config::Config::parse();
    let app = app::HookcastApp::bootstrap(config).await?;
    app.run().await
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("hookcast=info"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| eyre!(err))?;

    Ok(())
}
