use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::token::{self, Token};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Anything that can produce the token list of a wallet.
pub trait TokenSource: Send + Sync + 'static {
    fn fetch_tokens(
        &self,
        wallet: &str,
    ) -> impl Future<Output = Result<Vec<Token>, FetchError>> + Send;
}

/// HTTP client for `GET {base_url}/{wallet}`.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: Client,
    base_url: String,
}

impl TokenClient {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(TokenClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, wallet: &str) -> String {
        format!("{}/{}", self.base_url, wallet.trim())
    }
}

impl TokenSource for TokenClient {
    async fn fetch_tokens(&self, wallet: &str) -> Result<Vec<Token>, FetchError> {
        if wallet.trim().is_empty() {
            return Err(FetchError::EmptyWallet);
        }
        let url = self.url_for(wallet);
        debug!(%url, "fetching token data");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "token endpoint returned an error status");
            return Err(FetchError::Status { status });
        }

        let body = response.bytes().await?;
        let tokens = token::from_slice(&body).inspect_err(|e| {
            warn!(%url, error = %e, "could not parse token data");
        })?;
        debug!(count = tokens.len(), "token data received");
        Ok(tokens)
    }
}
