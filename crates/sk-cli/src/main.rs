//! Sketcher command line entry point

mod cli;

use anyhow::Result;
use clap::Parser;

use cli::{App, Cli};

fn main() -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sk_core=info,sk_solver=info,sketcher=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let app = App::new(cli.config.as_deref())?;
    app.run(cli.command)
}
