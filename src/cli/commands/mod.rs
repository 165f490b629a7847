mod auth;
mod logging;

pub use logging::validator_log_level;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const DEFAULT_MODEL_PATH: &str = "artifacts/iris_clf.json";
pub const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://localhost:8501";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("quickapi")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("QUICKAPI_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("QUICKAPI_DSN")
                .required(true),
        )
        .arg(
            Arg::new("model-path")
                .long("model-path")
                .help("Path to the iris classifier bundle (JSON)")
                .default_value(DEFAULT_MODEL_PATH)
                .env("QUICKAPI_MODEL_PATH"),
        )
        .arg(
            Arg::new("cors-origins")
                .long("cors-origins")
                .help("Comma-separated list of allowed browser origins")
                .default_value(DEFAULT_CORS_ORIGINS)
                .env("QUICKAPI_CORS_ORIGINS"),
        );

    let command = auth::with_args(command);
    logging::with_args(command)
}
