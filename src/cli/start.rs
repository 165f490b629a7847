use crate::cli::{actions::Action, commands, dispatch::handler, telemetry};
use anyhow::Result;

/// Start the CLI
///
/// # Errors
/// Returns an error if logging cannot be initialized or the arguments are invalid.
pub fn start() -> Result<Action> {
    // Missing .env is fine; explicit environment wins over it.
    let _ = dotenv::dotenv();

    let matches = commands::new().get_matches();

    let verbosity = matches.get_one::<u8>("verbosity").copied().unwrap_or(0);
    telemetry::init(Some(telemetry::verbosity_level(verbosity)))?;

    let action = handler(&matches)?;

    Ok(action)
}
