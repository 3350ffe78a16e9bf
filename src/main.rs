mod cli;

use clap::Parser;
use cli::{Cli, Commands, ServeArgs, ValidateArgs};
use mangabox::config::Config;
use mangabox::ingest::validator::{parse_metadata, parse_multi};
use tracing_subscriber::EnvFilter;

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await?,
        Commands::Validate(args) => validate(args)?,
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> Result<(), AnyError> {
    let mut config = match args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Some(address) = args.address {
        config.server.bind_addr = address;
    }

    mangabox::api::run(config).await
}

fn validate(args: ValidateArgs) -> Result<(), AnyError> {
    let raw = std::fs::read(&args.file)?;
    let report = if args.multi {
        parse_multi(&raw)?.validate()
    } else {
        parse_metadata(&raw)?.validate()
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_ok() {
        return Err(format!("{} has {} error(s)", args.file.display(), report.errors.len()).into());
    }
    Ok(())
}
