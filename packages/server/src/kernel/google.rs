//! Google identity-token verification.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::kernel::traits::{BaseSocialTokenVerifier, SocialIdentity};

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Claims returned by Google's tokeninfo endpoint. The endpoint itself
/// validates signature and expiry; we only check the audience.
#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<String>,
    name: Option<String>,
}

/// Verifies Google ID tokens against a configured OAuth client id.
pub struct GoogleTokenVerifier {
    client: reqwest::Client,
    client_id: String,
}

impl GoogleTokenVerifier {
    pub fn new(client_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
        }
    }
}

#[async_trait]
impl BaseSocialTokenVerifier for GoogleTokenVerifier {
    async fn verify(&self, id_token: &str) -> Result<SocialIdentity> {
        let response = self
            .client
            .get(TOKENINFO_URL)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .context("tokeninfo request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("invalid identity token"));
        }

        let info: TokenInfo = response
            .json()
            .await
            .context("tokeninfo response malformed")?;

        if info.aud != self.client_id {
            return Err(anyhow!("identity token audience mismatch"));
        }

        Ok(SocialIdentity {
            provider_id: info.sub,
            email: info.email,
            email_verified: info.email_verified.as_deref() == Some("true"),
            name: info.name,
        })
    }
}
