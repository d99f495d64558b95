use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

const LEGACY_VAPID_PUBLIC_KEY: &str = "VITE_VAPID_PUBLIC_KEY";
const LEGACY_VAPID_PRIVATE_KEY: &str = "VITE_VAPID_PRIVATE_KEY";

#[allow(clippy::large_enum_variant)]
pub(crate) enum RunOutcome {
    Serve(umkm_push::config::AppConfig),
    Exit(i32),
}

pub(crate) fn run() -> RunOutcome {
    let cli = Cli::parse();
    if let Some(Command::Init(args)) = cli.command {
        let code = run_init(args);
        return RunOutcome::Exit(code);
    }

    match resolve_config(cli, |name| std::env::var(name).ok()) {
        Ok(config) => RunOutcome::Serve(config),
        Err(err) => {
            eprintln!("error: {err}");
            RunOutcome::Exit(2)
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "umkm-push",
    version,
    about = "Web push delivery for UMKM Market"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[arg(long, env = "UMKM_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
    #[arg(long, env = "UMKM_ORIGIN", default_value = umkm_push::config::DEFAULT_ORIGIN)]
    origin: String,
    #[arg(long, env = "VAPID_PUBLIC_KEY")]
    vapid_public_key: Option<String>,
    #[arg(long, env = "VAPID_PRIVATE_KEY")]
    vapid_private_key: Option<String>,
    #[arg(long, env = "VAPID_SUBJECT")]
    vapid_subject: Option<String>,
    #[arg(long, env = "UMKM_JWT_SECRET")]
    jwt_secret: Option<String>,
    #[arg(long, env = "UMKM_JWT_ISSUER")]
    jwt_issuer: Option<String>,
    #[arg(long, env = "UMKM_SUBSCRIPTIONS_FILE")]
    subscriptions_file: Option<PathBuf>,
    #[arg(long, env = "UMKM_WEBHOOK_SECRET")]
    webhook_secret: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a VAPID key pair.
    Init(InitArgs),
}

#[derive(Args, Debug)]
struct InitArgs {
    #[arg(long)]
    subject: Option<String>,
    /// Required start of the encoded public key; empty accepts any key.
    #[arg(long, default_value = umkm_push::DEFAULT_PUBLIC_KEY_PREFIX)]
    prefix: String,
}

fn run_init(args: InitArgs) -> i32 {
    let credentials = match umkm_push::generate_vapid_credentials(&args.prefix) {
        Ok(credentials) => credentials,
        Err(err) => {
            eprintln!("failed to generate VAPID credentials: {err}");
            return 1;
        }
    };
    let subject = args
        .subject
        .unwrap_or_else(|| umkm_push::config::DEFAULT_VAPID_SUBJECT.to_string());

    println!("VAPID credentials generated.");
    println!();
    println!("VAPID_PUBLIC_KEY=\"{}\"", credentials.public_key);
    println!("VAPID_PRIVATE_KEY=\"{}\"", credentials.private_key);
    println!("VAPID_SUBJECT=\"{subject}\"");
    println!();
    println!(
        "--vapid-public-key \"{}\" --vapid-private-key \"{}\" --vapid-subject \"{subject}\"",
        credentials.public_key, credentials.private_key
    );
    0
}

/// Builds the server config. VAPID keys missing from flags and the unprefixed
/// variables are looked up under their legacy build-tool names.
fn resolve_config(
    cli: Cli,
    lookup_env: impl Fn(&str) -> Option<String>,
) -> Result<umkm_push::config::AppConfig, String> {
    let vapid_public_key = cli
        .vapid_public_key
        .or_else(|| lookup_env(LEGACY_VAPID_PUBLIC_KEY));
    let vapid_private_key = cli
        .vapid_private_key
        .or_else(|| lookup_env(LEGACY_VAPID_PRIVATE_KEY));

    let auth = match cli.jwt_secret {
        Some(secret) if secret.trim().is_empty() => {
            return Err("jwt secret cannot be empty".to_string());
        }
        Some(secret) => Some(umkm_push::config::AuthConfig {
            jwt_secret: secret,
            issuer: cli.jwt_issuer.filter(|issuer| !issuer.trim().is_empty()),
        }),
        None if cli.jwt_issuer.is_some() => {
            return Err("--jwt-issuer requires --jwt-secret".to_string());
        }
        None => None,
    };

    let origin = cli.origin.trim().trim_end_matches('/').to_string();
    if origin.is_empty() {
        return Err("origin cannot be empty".to_string());
    }

    Ok(umkm_push::config::AppConfig {
        bind: cli.bind,
        origin,
        vapid_private_key,
        vapid_public_key,
        vapid_subject: cli.vapid_subject,
        auth,
        subscriptions_file: cli.subscriptions_file,
        webhook_secret: cli.webhook_secret.filter(|secret| !secret.is_empty()),
    })
}
