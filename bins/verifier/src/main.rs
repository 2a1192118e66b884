//! Freightline identity token verifier.
//!
//! Verifies a Sign in with Apple or Google ID token with the same code path
//! the platform uses and prints the verified claims.
//!
//! ```text
//! freightline-verify apple eyJraWQiOi...
//! freightline-verify google eyJhbGciOi... --client-id 123.apps.googleusercontent.com
//! ```

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use freightline_core::identity::{IdentityVerifier, IdentityVerifiers, VerifiedClaims};
use freightline_shared::{AppConfig, AppError, AppResult};

#[derive(Parser, Debug)]
#[command(
    name = "freightline-verify",
    version,
    about = "Verify a third-party identity token and print its claims"
)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Verify a Sign in with Apple identity token
    Apple {
        /// Compact identity token
        token: String,
    },
    /// Verify a Google Sign-In ID token
    Google {
        /// Compact ID token
        token: String,
        /// OAuth client ID the token must be issued for (default: identity.google.client_id)
        #[arg(long)]
        client_id: Option<String>,
    },
}

fn init_tracing(json_logs: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "freightline=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Exit code for a failure, by the HTTP status it would map to.
fn exit_code(err: &AppError) -> u8 {
    match err.status_code() {
        401 => 1,
        400 => 2,
        _ => 3,
    }
}

/// Prints the failure the way the API would render it.
fn report_failure(err: &AppError) {
    eprintln!("error [{}]: {err}", err.error_code());
    if let Ok(body) = serde_json::to_string_pretty(&err.to_body()) {
        println!("{body}");
    }
}

async fn run(cli: Cli) -> AppResult<VerifiedClaims> {
    let config = AppConfig::load()?;
    debug!(environment = %config.environment, "Configuration loaded");

    let verifiers = IdentityVerifiers::from_config(&config)?;

    let result = match cli.command {
        Command::Apple { token } => verifiers.apple.verify_identity(&token).await,
        Command::Google { token, client_id } => {
            let verifier = verifiers.google_for(client_id.as_deref()).ok_or_else(|| {
                AppError::Validation(
                    "a Google client ID is required (--client-id or FREIGHTLINE__IDENTITY__GOOGLE__CLIENT_ID)"
                        .to_string(),
                )
            })?;
            verifier.verify_identity(&token).await
        }
    };

    result.map_err(AppError::from)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let claims = match run(cli).await {
        Ok(claims) => claims,
        Err(err) => {
            report_failure(&err);
            return ExitCode::from(exit_code(&err));
        }
    };

    info!(subject = ?claims.subject(), "Identity token verified");
    match serde_json::to_string_pretty(&claims) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let err = AppError::Internal(format!("failed to render claims: {e}"));
            report_failure(&err);
            ExitCode::from(exit_code(&err))
        }
    }
}
