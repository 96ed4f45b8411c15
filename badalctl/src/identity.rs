//! Phone-verification identity provider adapter.
//!
//! The form's OTP step happens client-side against the identity provider;
//! the backend only sees the resulting ID token and asks the provider who it
//! belongs to. Two adapters exist, selected from configuration at startup:
//! a Google Identity Toolkit (Firebase) REST adapter and a disabled adapter
//! that fails closed on every call. Call sites never probe for provider
//! availability.

use serde::Deserialize;

use crate::{config::IdentityConfig, errors::Error};

/// Structural prefix of a provider ID token (JWT header, base64 of `{"`).
pub const ID_TOKEN_PREFIX: &str = "eyJ";

/// Provider-asserted identity attached to a verified ID token.
#[derive(Debug, Clone)]
pub struct VerifiedPhone {
    pub phone_number: String,
}

pub struct PhoneVerifier {
    backend: VerifierBackend,
}

enum VerifierBackend {
    Firebase {
        http: reqwest::Client,
        base_url: String,
        api_key: String,
    },
    Disabled,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
struct LookupUser {
    #[serde(rename = "phoneNumber")]
    phone_number: Option<String>,
}

impl PhoneVerifier {
    pub fn new(config: &IdentityConfig) -> Result<Self, Error> {
        let backend = match config {
            IdentityConfig::Firebase { api_key, base_url, timeout } => {
                let http = reqwest::Client::builder().timeout(*timeout).build().map_err(|e| Error::Internal {
                    operation: format!("build identity HTTP client: {e}"),
                })?;
                VerifierBackend::Firebase {
                    http,
                    base_url: base_url.trim_end_matches('/').to_string(),
                    api_key: api_key.clone(),
                }
            }
            IdentityConfig::Disabled => VerifierBackend::Disabled,
        };

        Ok(Self { backend })
    }

    /// Decode a provider ID token into the phone number it asserts.
    ///
    /// The disabled backend rejects every call; a provider that answers
    /// without a phone number is treated as an invalid token.
    pub async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedPhone, Error> {
        if !id_token.starts_with(ID_TOKEN_PREFIX) {
            return Err(Error::InvalidIdToken);
        }

        match &self.backend {
            VerifierBackend::Disabled => Err(Error::VerificationUnavailable),
            VerifierBackend::Firebase { http, base_url, api_key } => {
                let url = format!("{base_url}/v1/accounts:lookup?key={api_key}");
                let response = http
                    .post(&url)
                    .json(&serde_json::json!({ "idToken": id_token }))
                    .send()
                    .await
                    .map_err(|e| {
                        if e.is_timeout() {
                            Error::Internal {
                                operation: "verify identity token: provider timed out".to_string(),
                            }
                        } else {
                            Error::Internal {
                                operation: format!("verify identity token: {e}"),
                            }
                        }
                    })?;

                if !response.status().is_success() {
                    tracing::debug!("identity provider rejected token lookup: {}", response.status());
                    return Err(Error::InvalidIdToken);
                }

                let lookup: LookupResponse = response.json().await.map_err(|e| Error::Internal {
                    operation: format!("decode identity provider response: {e}"),
                })?;

                let phone_number = lookup
                    .users
                    .into_iter()
                    .next()
                    .and_then(|u| u.phone_number)
                    .ok_or(Error::InvalidIdToken)?;

                Ok(VerifiedPhone { phone_number })
            }
        }
    }
}
