//! Example: signing in from a terminal
//!
//! The authorization URL is printed; open it in a browser, finish signing
//! in, then paste the URL the browser was redirected to.
//!
//! # Setup
//!
//! ```bash
//! export AUTHGEAR_CLIENT_ID=your-client-id
//! export AUTHGEAR_ENDPOINT=https://your-project.authgear.cloud
//! cargo run --example authgear_demo
//! ```
//!
//! Settings may also come from an `authgear.toml` next to the working
//! directory, or from a `.env` file.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use authgear_core::UiPresenter;
use authgear_domain::{AuthenticateOptions, AuthgearError, Result as AuthgearResult};
use authgear_infra::{config, observability, Bootstrap};
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

const REDIRECT_URI: &str = "http://localhost:8080/after-authentication";

/// Presenter that talks through stdin and stdout
struct TerminalPresenter;

#[async_trait]
impl UiPresenter for TerminalPresenter {
    async fn open_authorization_url(&self, url: &Url, redirect_uri: &str) -> AuthgearResult<Url> {
        println!("Open this URL to sign in:\n\n  {url}\n");
        println!("Then paste the URL starting with {redirect_uri} (empty line cancels):");
        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| AuthgearError::Internal(format!("stdin: {e}")))?;
        let line = line.trim();
        if line.is_empty() {
            return Err(AuthgearError::Cancelled);
        }
        Url::parse(line).map_err(|e| AuthgearError::InvalidInput(format!("redirect URL: {e}")))
    }

    async fn open_url(&self, url: &Url) -> AuthgearResult<()> {
        println!("Open: {url}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    observability::init_tracing(false)?;

    let config = config::load().context("loading Authgear configuration")?;
    let authgear = Bootstrap::new(config).with_presenter(Arc::new(TerminalPresenter)).build()?;
    authgear.configure().await?;

    let mut changes = authgear.subscribe();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let change = changes.borrow().clone();
            println!("session: {:?} ({:?})", change.state, change.reason);
        }
    });

    let user = match authgear.refresh_access_token_if_needed().await? {
        Some(_) => authgear.fetch_user_info().await?,
        None => authgear.authenticate(AuthenticateOptions::new(REDIRECT_URI)).await?.user_info,
    };
    println!("Signed in as {}", user.email.as_deref().unwrap_or(&user.sub));

    if std::env::args().any(|arg| arg == "--logout") {
        authgear.logout(true).await?;
        println!("Signed out");
    }
    Ok(())
}
