//! Issue a registry bearer token
//!
//! Identity and role are asserted by whoever holds the signing secret; this
//! tool is how operators mint tokens for officials and test accounts.
//!
//! Usage:
//!   issue-token --subject alice --role owner
//!   issue-token --subject oscar --role official --jwt-secret $JWT_SECRET

use clap::Parser;
use land_registry::auth::{JwtValidator, Role, TokenInput};

#[derive(Parser, Debug)]
#[command(name = "issue-token")]
#[command(about = "Mint a JWT for a land registry identity")]
#[command(version)]
struct Args {
    /// Identity the token speaks for
    #[arg(long)]
    subject: String,

    /// citizen, owner, official or admin
    #[arg(long, default_value = "citizen")]
    role: String,

    /// Signing secret; omit together with --dev-mode for the development secret
    #[arg(long, env = "JWT_SECRET")]
    jwt_secret: Option<String>,

    /// Token lifetime in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    expiry_seconds: u64,

    /// Sign with the public development secret
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    dev_mode: bool,
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let role = Role::parse(&args.role)
        .ok_or_else(|| anyhow::anyhow!("Unknown role '{}'", args.role))?;

    let validator = match args.jwt_secret {
        Some(secret) if !secret.is_empty() => JwtValidator::new(secret, args.expiry_seconds)?,
        _ if args.dev_mode => JwtValidator::new_dev(),
        _ => anyhow::bail!("JWT_SECRET is required unless --dev-mode is set"),
    };

    let token = validator.generate_token(TokenInput {
        subject: args.subject,
        role,
    })?;
    println!("{}", token);
    Ok(())
}
