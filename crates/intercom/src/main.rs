// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Intercom - call signaling and lifecycle server.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod seed;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use intercom_config::IntercomConfig;
use intercom_core::{IntercomError, TokenRole};
use intercom_tokens::TokenIssuer;

/// Intercom - call signaling and lifecycle server.
#[derive(Parser, Debug)]
#[command(name = "intercom", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the REST gateway and the stale call sweeper.
    Serve,
    /// Load buildings, profiles and apartments from a TOML file.
    Seed {
        /// Directory file to load.
        #[arg(long)]
        file: PathBuf,
    },
    /// Mint a token bundle and print it as JSON.
    IssueToken {
        /// Channel the bundle is scoped to.
        #[arg(long)]
        channel: String,
        /// User id the bundle is scoped to.
        #[arg(long)]
        uid: String,
        /// `publisher` (default) or `subscriber`.
        #[arg(long)]
        role: Option<String>,
        /// Lifetime in seconds; defaults to tokens.default_ttl_secs.
        #[arg(long)]
        ttl: Option<i64>,
    },
}

fn load_config(path: Option<&std::path::Path>) -> IntercomConfig {
    let loaded = match path {
        Some(path) => intercom_config::load_and_validate_path(path),
        None => intercom_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            intercom_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

fn issue_token(
    config: &IntercomConfig,
    channel: &str,
    uid: &str,
    role: Option<&str>,
    ttl: Option<i64>,
) -> Result<String, IntercomError> {
    let issuer = TokenIssuer::from_config(&config.tokens);
    let bundle = issuer.issue(channel, uid, TokenRole::from_requested(role), ttl)?;
    serde_json::to_string_pretty(&bundle)
        .map_err(|e| IntercomError::Internal(format!("failed to encode token bundle: {e}")))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());
    serve::init_tracing(&config.logging.level);

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Seed { file } => seed::run_seed(&config, &file).await.map(|report| {
            println!(
                "seeded {} buildings, {} profiles, {} apartments, {} residents",
                report.buildings, report.profiles, report.apartments, report.residents
            );
        }),
        Commands::IssueToken {
            channel,
            uid,
            role,
            ttl,
        } => issue_token(&config, &channel, &uid, role.as_deref(), ttl).map(|json| {
            println!("{json}");
        }),
    };

    if let Err(e) = result {
        eprintln!("intercom: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc supports advancing the epoch.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["intercom", "seed", "--file", "dir.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::Seed { ref file } if file == &PathBuf::from("dir.toml")));

        let cli = Cli::try_parse_from([
            "intercom",
            "--config",
            "custom.toml",
            "issue-token",
            "--channel",
            "standby-r1",
            "--uid",
            "r1",
            "--ttl",
            "60",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert!(matches!(cli.command, Commands::IssueToken { ttl: Some(60), .. }));

        assert!(Cli::try_parse_from(["intercom"]).is_err());
    }

    #[test]
    fn issue_token_prints_a_scoped_bundle() {
        let config = intercom_config::load_and_validate_str(
            "[tokens]\napp_id = \"app\"\napp_certificate = \"cert\"\n",
        )
        .unwrap();
        let json = issue_token(&config, "standby-r1", "r1", Some("subscriber"), Some(60)).unwrap();
        let bundle: intercom_core::TokenBundle = serde_json::from_str(&json).unwrap();
        assert_eq!(bundle.uid, "r1");
        assert_eq!(bundle.channel_name, "standby-r1");
        assert_eq!(bundle.role, TokenRole::Subscriber);
        assert_eq!(bundle.ttl_seconds, 60);
    }

    #[test]
    fn issue_token_without_certificate_fails() {
        let config = intercom_config::load_and_validate_str("").unwrap();
        let err = issue_token(&config, "standby-r1", "r1", None, None).unwrap_err();
        assert_eq!(err.kind(), intercom_core::ErrorKind::Upstream);
    }
}
