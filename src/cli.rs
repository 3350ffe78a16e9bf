use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mangabox")]
#[command(about = "mangabox upload orchestration service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Check a metadata document offline, without touching any store
    Validate(ValidateArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Configuration file (defaults to MANGABOX_CONFIG or config/mangabox.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to bind the HTTP server to, overriding the configuration
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    /// Metadata JSON document
    pub file: PathBuf,

    /// Treat the file as a multi-title config (`{"titles": [...]}`)
    #[arg(long)]
    pub multi: bool,
}
