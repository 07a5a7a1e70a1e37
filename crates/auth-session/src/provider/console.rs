//! Terminal authorization agent used by the CLI.
//!
//! Prints the authorization URL, then reads either the full redirect URL or
//! the bare authorization code from stdin. An empty line cancels the login.

use super::{AuthorizationAgent, AuthorizationCallback};
use crate::errors::ProviderError;
use async_trait::async_trait;
use common::secret::SecretString;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleAuthorizationAgent;

impl ConsoleAuthorizationAgent {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuthorizationAgent for ConsoleAuthorizationAgent {
    async fn authorize(
        &self,
        authorization_url: &str,
    ) -> Result<AuthorizationCallback, ProviderError> {
        let mut stderr = tokio::io::stderr();
        let prompt = format!(
            "Open this URL in your browser and sign in:\n\n  {authorization_url}\n\n\
             Paste the URL you were redirected to (or the code), empty line to cancel:\n> "
        );
        stderr
            .write_all(prompt.as_bytes())
            .await
            .map_err(|e| ProviderError::Network(format!("terminal unavailable: {e}")))?;
        stderr.flush().await.ok();

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| ProviderError::Network(format!("terminal unavailable: {e}")))?;

        parse_console_input(&line, authorization_url)
    }
}

/// Interpret one line of user input.
///
/// A bare code carries no `state`; the one sent in `authorization_url` is
/// echoed back, since the user pasted the code by hand.
pub fn parse_console_input(
    input: &str,
    authorization_url: &str,
) -> Result<AuthorizationCallback, ProviderError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ProviderError::UserCancelled);
    }

    if input.starts_with("http://") || input.starts_with("https://") {
        return AuthorizationCallback::from_redirect_url(input);
    }

    let state = reqwest::Url::parse(authorization_url).ok().and_then(|url| {
        url.query_pairs()
            .find(|(name, _)| name == "state")
            .map(|(_, value)| value.into_owned())
    });

    Ok(AuthorizationCallback {
        code: SecretString::from(input.to_string()),
        state,
    })
}
