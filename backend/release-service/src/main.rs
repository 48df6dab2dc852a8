/// Release Service - CLI and webhook server entrypoint
use anyhow::Context;
use clap::Parser;
use release_service::cli::{self, Cli};
use release_service::ReleaseConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() -> anyhow::Result<()> {
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // stdout carries only the JSON result line
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .try_init()
        .context("failed to install tracing subscriber")
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_tracing()?;

    let result = match ReleaseConfig::from_env() {
        Ok(config) => cli::execute(args.command, config).await,
        Err(err) => Err(err),
    };

    let code = match result {
        Ok(output) => {
            println!("{}", output.body);
            output.exit_code()
        }
        Err(err) => {
            tracing::error!(
                reason = err.category().reason_code(),
                error = %err,
                "Command failed"
            );
            println!("{}", cli::failure_body(&err));
            err.category().exit_code()
        }
    };

    std::process::exit(code)
}
