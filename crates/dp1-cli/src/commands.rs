use anyhow::{bail, Context};
use colored::Colorize;
use dp1_crypto::{verify_value, SigningKey, VerifyingKey, PRIVATE_KEY_VAR};
use dp1_server::{FeedServer, ServerConfig};
use serde_json::{json, Value};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Keygen => cmd_keygen(&cli.format),
        Command::Verify(args) => cmd_verify(args, &cli.format),
    }
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    }
    .with_env_overrides();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    let signer = SigningKey::from_env().context("loading signing key")?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let server = FeedServer::new(config, signer);
        server
            .serve(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for shutdown signal");
                }
                tracing::info!("shutdown requested");
            })
            .await
    })?;
    Ok(())
}

fn cmd_keygen(format: &OutputFormat) -> anyhow::Result<()> {
    let key = SigningKey::generate();
    let private_hex = hex::encode(key.as_bytes());
    let public_hex = key.verifying_key().to_hex();
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "privateKey": private_hex, "publicKey": public_hex })
        ),
        OutputFormat::Text => {
            println!("{} Generated Ed25519 key", "✓".green().bold());
            println!("  {}: {}", PRIVATE_KEY_VAR.bold(), private_hex.yellow());
            println!("  Public key: {}", public_hex.cyan());
        }
    }
    Ok(())
}

fn cmd_verify(args: VerifyArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let resource: Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", args.file.display()))?;
    let Some(key) = VerifyingKey::from_hex(&args.public_key) else {
        bail!("invalid public key: expected 32 bytes of hex");
    };
    let valid = verify_value(&resource, &key.as_bytes());
    let id = resource.get("id").and_then(Value::as_str).unwrap_or("<no id>");
    match format {
        OutputFormat::Json => println!("{}", json!({ "id": id, "valid": valid })),
        OutputFormat::Text if valid => {
            println!("{} Signature valid for {}", "✓".green().bold(), id.yellow());
        }
        OutputFormat::Text => {
            println!("{} Signature invalid for {}", "✗".red().bold(), id.yellow());
        }
    }
    if !valid {
        bail!("signature verification failed");
    }
    Ok(())
}
