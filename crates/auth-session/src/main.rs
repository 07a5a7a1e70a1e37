use anyhow::{bail, Context};
use auth_session::provider::{ConsoleAuthorizationAgent, HttpIdentityProvider};
use auth_session::storage::{FileSecureStore, FileStore};
use auth_session::{SessionConfig, SessionManager};
use common::secret::ExposeSecret;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: auth-session <status|whoami|login|refresh|logout|header>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auth_session=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Some(command) = std::env::args().nth(1) else {
        bail!(USAGE);
    };

    let config = SessionConfig::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let secure_store = Arc::new(FileSecureStore::new(config.storage_dir.join("secure")));
    let store = Arc::new(FileStore::new(config.storage_dir.join("data")));
    let provider = Arc::new(HttpIdentityProvider::new(
        &config,
        Arc::new(ConsoleAuthorizationAgent::new()),
    ));
    let session = SessionManager::from_config(&config, secure_store, store, provider);

    match command.as_str() {
        "status" => {
            let authenticated = session.is_authenticated().await;
            println!("{}", if authenticated { "authenticated" } else { "not authenticated" });
        }
        "whoami" => {
            if !session.is_authenticated().await {
                bail!("not authenticated");
            }
            let identity = session
                .get_user_info()
                .await
                .context("no stored profile")?;
            println!("{} <{}>", identity.display_name, identity.email);
            println!("role: {}", session.classify(&identity));
        }
        "login" => {
            info!(issuer = %config.issuer, "Starting login");
            let identity = session.login().await?;
            println!("signed in as {} ({})", identity.display_name, session.classify(&identity));
        }
        "refresh" => {
            session.refresh().await?;
            println!("session refreshed");
        }
        "logout" => {
            session.logout().await?;
            println!("signed out");
        }
        "header" => {
            let header = session
                .get_authorization_header()
                .await
                .context("not authenticated")?;
            println!("Authorization: {}", header.expose_secret());
        }
        other => bail!("unknown command '{other}'\n{USAGE}"),
    }

    Ok(())
}
