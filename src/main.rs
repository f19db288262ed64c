//! tryon CLI binary entry point.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tryon_client::cli::{session, Cli, Commands, SessionCommands};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tryon_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse_args();

    let result = match tryon_client::cli::load_config(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Call(args) => tryon_client::cli::handle_call(config, &args).await,
            Commands::Session(session_args) => match session_args.command {
                SessionCommands::Status => session::handle_status(config).await,
                SessionCommands::Import(args) => session::handle_import(config, &args).await,
                SessionCommands::Refresh => session::handle_refresh(config).await,
                SessionCommands::Logout => session::handle_logout(config).await,
            },
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", tryon_client::cli::error_message(e.as_ref()));
        std::process::exit(tryon_client::cli::exit_code(e.as_ref()));
    }
}
