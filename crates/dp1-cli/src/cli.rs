use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "dp1-feed",
    about = "DP-1 feed server: signed playlists and channels over HTTP",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the feed server and its queue consumer
    Serve(ServeArgs),
    /// Generate a new Ed25519 signing key
    Keygen,
    /// Verify the signature of a playlist or channel JSON file
    Verify(VerifyArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override the configured bind address
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Path to the signed resource
    pub file: PathBuf,
    /// Hex-encoded Ed25519 public key, optionally 0x-prefixed
    #[arg(long)]
    pub public_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["dp1-feed", "serve", "--config", "feed.toml", "--bind", "0.0.0.0:8080"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.config, Some(PathBuf::from("feed.toml")));
            assert_eq!(args.bind, Some("0.0.0.0:8080".parse().unwrap()));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_serve_defaults() {
        let cli = Cli::try_parse_from(["dp1-feed", "serve"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert!(args.config.is_none());
            assert!(args.bind.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_keygen() {
        let cli = Cli::try_parse_from(["dp1-feed", "keygen"]).unwrap();
        assert!(matches!(cli.command, Command::Keygen));
    }

    #[test]
    fn parse_verify() {
        let cli = Cli::try_parse_from(["dp1-feed", "verify", "p.json", "--public-key", "0xabcd"]).unwrap();
        if let Command::Verify(args) = cli.command {
            assert_eq!(args.file, PathBuf::from("p.json"));
            assert_eq!(args.public_key, "0xabcd");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn verify_requires_public_key() {
        assert!(Cli::try_parse_from(["dp1-feed", "verify", "p.json"]).is_err());
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["dp1-feed", "--verbose", "keygen"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["dp1-feed", "--format", "json", "keygen"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
