use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::RwLock;

use crate::error::{IntegrationError, Result};

/// Mints a fresh bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self, cli_path: &str) -> Result<String>;
}

/// Runs `<cli> auth print-access-token` and takes stdout as the token.
pub struct GcloudTokenSource;

#[async_trait]
impl TokenSource for GcloudTokenSource {
    async fn fetch_token(&self, cli_path: &str) -> Result<String> {
        let output = Command::new(cli_path)
            .args(["auth", "print-access-token"])
            .output()
            .await
            .map_err(|e| IntegrationError::TokenRefresh(format!("failed to run {cli_path}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IntegrationError::TokenRefresh(format!(
                "{cli_path} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(IntegrationError::TokenRefresh(format!(
                "{cli_path} printed no access token"
            )));
        }
        Ok(token)
    }
}

/// Process-wide bearer token. Last writer wins.
#[derive(Debug, Default)]
pub struct TokenCache {
    token: RwLock<Option<String>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    pub async fn get_or_fetch(&self, source: &dyn TokenSource, cli_path: &str) -> Result<String> {
        if let Some(token) = self.current().await {
            return Ok(token);
        }
        self.refresh(source, cli_path).await
    }

    pub async fn refresh(&self, source: &dyn TokenSource, cli_path: &str) -> Result<String> {
        let token = source.fetch_token(cli_path).await.inspect_err(|e| {
            tracing::error!("Refresh Token Error: {}", e);
        })?;
        *self.token.write().await = Some(token.clone());
        tracing::debug!("Got a refreshed token");
        Ok(token)
    }
}
