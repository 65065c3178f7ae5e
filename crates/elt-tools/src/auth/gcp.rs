//! GCP Application Default Credentials authentication.

use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::PipelineError;

/// Scopes needed to create datasets and run load jobs.
pub const BIGQUERY_SCOPES: &[&str] = &["https://www.googleapis.com/auth/bigquery"];

/// Bearer-token source backed by gcp_auth's provider chain:
/// 1. GOOGLE_APPLICATION_CREDENTIALS environment variable
/// 2. gcloud CLI configuration
/// 3. GCE/GKE metadata service
///
/// The provider is resolved on first use and shared between clones.
#[derive(Clone, Default)]
pub struct GcpAuth {
    provider: Arc<OnceCell<Arc<dyn gcp_auth::TokenProvider>>>,
}

impl GcpAuth {
    /// Create a new GCP auth provider.
    pub fn new() -> Self {
        Self::default()
    }

    async fn provider(&self) -> Result<&Arc<dyn gcp_auth::TokenProvider>, PipelineError> {
        self.provider
            .get_or_try_init(|| async {
                gcp_auth::provider()
                    .await
                    .map_err(|e| PipelineError::Auth(format!("Failed to initialize GCP auth: {}", e)))
            })
            .await
    }

    /// Get an access token for the given scopes.
    pub async fn token(&self, scopes: &[&str]) -> Result<String, PipelineError> {
        let token = self
            .provider()
            .await?
            .token(scopes)
            .await
            .map_err(|e| PipelineError::Auth(format!("Failed to get GCP token: {}", e)))?;

        Ok(token.as_str().to_string())
    }

    /// Get an access token with the BigQuery scope.
    pub async fn bigquery_token(&self) -> Result<String, PipelineError> {
        self.token(BIGQUERY_SCOPES).await
    }
}

impl std::fmt::Debug for GcpAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpAuth")
            .field("initialized", &self.provider.initialized())
            .finish()
    }
}
