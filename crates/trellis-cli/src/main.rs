use anyhow::Result;
use clap::Parser;

use trellis_cli::{
    cli::{Cli, Commands},
    commands, logging,
};
use trellis_config::TrellisConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = TrellisConfig::load_or_default(cli.config.as_deref())?;
    logging::init(&config.logging, cli.log_level, cli.verbose);

    match cli.command {
        Commands::Paths { intent } => commands::paths::execute(&intent)?,
        Commands::Compile {
            intent,
            schema,
            explain,
        } => commands::compile::execute(&config, &intent, schema, explain).await?,
        Commands::Run {
            intent,
            schema,
            data,
            timeout,
        } => commands::run::execute(&config, &intent, schema, data, timeout).await?,
    }

    Ok(())
}
