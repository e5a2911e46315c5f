//! OAuth 2.0 service-account token source (JWT bearer grant).

use crate::http::map_http_error;
use crate::{AccessToken, TokenSource};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use missive_core::{decode_result, Error, JsonCodec};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// The fields of a service-account key file this source needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountCredentials {
    pub project_id: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub client_email: String,
    pub private_key: String,
}

impl ServiceAccountCredentials {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid service account credentials: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&contents)
    }
}

impl fmt::Debug for ServiceAccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredentials")
            .field("project_id", &self.project_id)
            .field("token_uri", &self.token_uri)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Produces the signature over a JWT signing input.
///
/// Key handling stays with the implementor; `private_key` from the
/// credentials is passed through untouched.
pub trait AssertionSigner: Send + Sync + 'static {
    /// JOSE algorithm name, e.g. `RS256`.
    fn algorithm(&self) -> &str;

    fn sign(&self, private_key: &str, signing_input: &[u8]) -> Result<Vec<u8>, Error>;
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Builds the signed assertion for `now`, valid for one hour.
pub fn build_assertion(
    credentials: &ServiceAccountCredentials,
    scope: Option<&str>,
    signer: &dyn AssertionSigner,
    now: DateTime<Utc>,
) -> Result<String, Error> {
    let header = json!({"alg": signer.algorithm(), "typ": "JWT"});
    let claims = Claims {
        iss: &credentials.client_email,
        scope,
        aud: &credentials.token_uri,
        iat: now.timestamp(),
        exp: (now + ChronoDuration::hours(1)).timestamp(),
    };

    let signing_input = format!("{}.{}", segment(&header)?, segment(&claims)?);
    let signature = signer.sign(&credentials.private_key, signing_input.as_bytes())?;
    Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)))
}

fn segment<T: Serialize>(value: &T) -> Result<String, Error> {
    let bytes = serde_json::to_vec(value).map_err(|e| Error::Codec(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Exchanges a signed assertion for an access token at `token_uri`.
pub struct ServiceAccountTokenSource<G> {
    http: HttpClient,
    credentials: ServiceAccountCredentials,
    signer: G,
    scope: Option<String>,
}

impl<G: AssertionSigner> ServiceAccountTokenSource<G> {
    pub fn new(credentials: ServiceAccountCredentials, signer: G) -> Self {
        Self {
            http: HttpClient::new(),
            credentials,
            signer,
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }
}

impl<G> fmt::Debug for ServiceAccountTokenSource<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountTokenSource")
            .field("credentials", &self.credentials)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<G: AssertionSigner> TokenSource for ServiceAccountTokenSource<G> {
    async fn fetch(&self) -> Result<AccessToken, Error> {
        let assertion = build_assertion(
            &self.credentials,
            self.scope.as_deref(),
            &self.signer,
            Utc::now(),
        )?;

        debug!(token_uri = %self.credentials.token_uri, "requesting access token");
        let response = self
            .http
            .post(&self.credentials.token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT_TYPE),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| map_http_error(e, None))?;

        let status = response.status();
        let payload = response
            .bytes()
            .await
            .map_err(|e| map_http_error(e, None))?;

        if status != reqwest::StatusCode::OK {
            warn!(status = status.as_u16(), "token endpoint refused assertion");
            return Err(Error::transport(status.as_u16(), payload));
        }

        decode_result(&JsonCodec, payload)
    }
}
