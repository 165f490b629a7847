use clap::{Arg, Command};

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("secret-key")
                .long("secret-key")
                .help("HMAC key used to sign bearer tokens (at least 16 bytes)")
                .env("QUICKAPI_SECRET_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("token-ttl-minutes")
                .long("token-ttl-minutes")
                .help("Access token lifetime in minutes")
                .default_value("60")
                .env("QUICKAPI_TOKEN_TTL_MINUTES")
                .value_parser(clap::value_parser!(i64).range(1..=10_080)),
        )
}
