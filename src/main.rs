use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use openwp_licence::{
    FileSettings, Licence, LicenceConfig, LicenceOptions, OneTimeTokens, SettingsStore,
    VALIDATE_ACTION,
};

#[derive(Parser, Debug)]
#[command(name = "openwp-licence")]
#[command(about = "Check, activate and update an OpenWP licence")]
struct Cli {
    /// Directory holding licence.json (settings and activation flag)
    #[arg(long, env = "LICENCE_SETTINGS_DIR", default_value = ".")]
    settings_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show key, validity and activation state
    Status,
    /// Periodic check: validate, repair a stale activation, list notices
    Check,
    /// Store a licence key and check it
    SetKey { key: String },
    /// Issue a one-time token for activate/deactivate
    IssueToken,
    /// Activate this instance
    Activate {
        #[arg(long)]
        token: String,
    },
    /// Release this instance's activation
    Deactivate {
        #[arg(long)]
        token: String,
    },
    /// Look for a newer release
    Update {
        /// Installed package version (default: LICENCE_PLUGIN_VERSION)
        #[arg(long)]
        current: Option<String>,
        /// Host platform version
        #[arg(long)]
        host: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "openwp_licence=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = LicenceConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(2);
    });

    let settings: Arc<dyn SettingsStore> = match FileSettings::new(&cli.settings_dir) {
        Some(settings) => Arc::new(settings),
        None => {
            eprintln!("Settings directory not found: {}", cli.settings_dir.display());
            std::process::exit(2);
        }
    };
    let tokens = Arc::new(OneTimeTokens::new(settings.clone()));
    let key_source = config.key_sources.first().cloned();
    let current_default = config.plugin_version.clone();

    let licence = Licence::new(
        config,
        LicenceOptions {
            settings: Some(settings.clone()),
            nonces: Some(tokens.clone()),
            ..Default::default()
        },
    )
    .unwrap_or_else(|e| {
        eprintln!("Failed to create HTTP client: {}", e);
        std::process::exit(2);
    });

    match cli.command {
        Command::Status => {
            let state = licence.state();
            println!("key:        {:?}", state.key());
            println!("standing:   {:?}", state.standing().await);
            println!("activation: {:?}", state.activation_status());
            if let Some(version) = state.latest_version().await {
                println!("latest:     {}", version);
            }
        }
        Command::Check => {
            let notices = licence.periodic_check().await;
            if notices.is_empty() {
                println!("Licence valid and activated");
            }
            for notice in notices {
                println!("{}", notice.message());
            }
        }
        Command::SetKey { key } => {
            let Some(source) = key_source else {
                eprintln!("No key source configured (LICENCE_KEY_SOURCES)");
                std::process::exit(2);
            };
            settings.set(&source, &key);
            let valid = licence.settings_saved().await;
            println!("{}", if valid { "Key is valid" } else { "Key is invalid" });
        }
        Command::IssueToken => {
            println!("{}", tokens.issue(VALIDATE_ACTION));
        }
        Command::Activate { token } => match licence.activate(&token).await {
            Ok(()) => println!("Activated"),
            Err(e) if e.is_noop() => println!("{}", e),
            Err(e) => {
                eprintln!("Activation failed: {}", e);
                std::process::exit(1);
            }
        },
        Command::Deactivate { token } => match licence.deactivate(&token).await {
            Ok(()) => println!("Deactivated"),
            Err(e) if e.is_noop() => println!("{}", e),
            Err(e) => {
                eprintln!("Deactivation failed: {}", e);
                std::process::exit(1);
            }
        },
        Command::Update { current, host } => {
            let current = current.unwrap_or(current_default);
            match licence.plugin_update(&current, &host).await {
                Some(update) => match serde_json::to_string_pretty(&update) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Failed to serialize update: {}", e);
                        std::process::exit(1);
                    }
                },
                None => println!("No update available"),
            }
        }
    }
}
