use crate::cli::actions::{server::Args, Action};
use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use std::path::PathBuf;

pub const SECRET_KEY_MIN_BYTES: usize = 16;

/// Split a comma-separated origin list, dropping blanks and trailing slashes.
fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|origin| origin.trim().trim_end_matches('/'))
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

/// # Errors
/// Returns an error if required arguments are missing or the secret key is too short.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let secret_key = matches
        .get_one::<String>("secret-key")
        .cloned()
        .context("missing required argument: --secret-key")?;
    if secret_key.len() < SECRET_KEY_MIN_BYTES {
        bail!("--secret-key must be at least {SECRET_KEY_MIN_BYTES} bytes");
    }

    let token_ttl_minutes = matches
        .get_one::<i64>("token-ttl-minutes")
        .copied()
        .unwrap_or(60);

    let model_path = matches
        .get_one::<String>("model-path")
        .map(PathBuf::from)
        .context("missing argument: --model-path")?;

    let cors_origins = matches
        .get_one::<String>("cors-origins")
        .map(|value| parse_origins(value))
        .unwrap_or_default();

    Ok(Action::Server(Args {
        port,
        dsn,
        secret_key: SecretString::from(secret_key),
        token_ttl_minutes,
        model_path,
        cors_origins,
    }))
}
