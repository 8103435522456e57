//! Credential flows producing an authorized [`Session`]
//!
//! Two flows are supported, picked once from the destination URL and the
//! environment:
//!
//! - service account: `GDRIVE_SERVICE_KEY_FILE` plus
//!   `gdrive://<account>@<project>.iam.gserviceaccount.com/<path>`. Note
//!   that a service account has its own drive.
//! - installed app: `GDRIVE_APP_SECRET`, `GDRIVE_APP_TOKEN_FILE` plus
//!   `gdrive://<client id>/<path>`. The first run prints an authorization
//!   URL; set `GDRIVE_APP_CODE` to the returned code and run again to
//!   write the token file.

use std::path::{Path, PathBuf};

use dg_core::{Destination, Error, Result};
use jiff::{SignedDuration, Timestamp};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
pub const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

pub const SERVICE_KEY_FILE_ENV: &str = "GDRIVE_SERVICE_KEY_FILE";
pub const APP_SECRET_ENV: &str = "GDRIVE_APP_SECRET";
pub const APP_TOKEN_FILE_ENV: &str = "GDRIVE_APP_TOKEN_FILE";
pub const APP_CODE_ENV: &str = "GDRIVE_APP_CODE";

const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Treat tokens this close to expiry as already expired
const EXPIRY_MARGIN_SECS: i64 = 60;

/// How credentials are obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    ServiceAccount {
        key_file: PathBuf,
        /// `user@host` from the destination URL; must match the key
        account: String,
    },
    InstalledApp {
        client_id: String,
        client_secret: String,
        token_file: PathBuf,
        code: Option<String>,
    },
}

impl AuthMethod {
    /// Select the flow from the process environment
    pub fn from_env(destination: &Destination) -> Result<Self> {
        Self::select(destination, |key| {
            std::env::var(key).ok().filter(|v| !v.is_empty())
        })
    }

    /// Select the flow using `env` as the variable lookup
    pub fn select<F>(destination: &Destination, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key_file) = env(SERVICE_KEY_FILE_ENV)
            && destination.user.is_some()
        {
            return Ok(AuthMethod::ServiceAccount {
                key_file: PathBuf::from(key_file),
                account: destination.authority(),
            });
        }

        if let (Some(client_secret), Some(token_file)) = (env(APP_SECRET_ENV), env(APP_TOKEN_FILE_ENV))
        {
            return Ok(AuthMethod::InstalledApp {
                client_id: destination.host.clone(),
                client_secret,
                token_file: PathBuf::from(token_file),
                code: env(APP_CODE_ENV),
            });
        }

        Err(Error::Config(format!(
            "*** for Installed App: {APP_TOKEN_FILE_ENV}, {APP_SECRET_ENV}, gdrive://app_client_id/path \
             *** for Service Account: {SERVICE_KEY_FILE_ENV}, gdrive://service_account_email/path"
        )))
    }
}

/// An authorized capability for Drive requests
#[derive(Clone)]
pub struct Session {
    access_token: String,
    expires_at: Option<Timestamp>,
}

impl Session {
    pub fn new(access_token: impl Into<String>, expires_at: Option<Timestamp>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expires_at
    }

    pub fn is_expiring(&self, now: Timestamp) -> bool {
        expires_within_margin(self.expires_at, now)
    }
}

fn expires_within_margin(expires_at: Option<Timestamp>, now: Timestamp) -> bool {
    expires_at.is_some_and(|at| at.as_second() - EXPIRY_MARGIN_SECS <= now.as_second())
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token persisted for the installed-app flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
}

impl StoredToken {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        expires_within_margin(self.expires_at, now)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Auth(format!("token file {} is invalid: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Auth(format!("serialize token: {e}")))?;
        std::fs::write(path, content)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn session(&self) -> Session {
        Session::new(self.access_token.clone(), self.expires_at)
    }
}

/// Subset of a service account JSON key
#[derive(Debug, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    TOKEN_URI.to_string()
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl AssertionClaims {
    pub fn new(key: &ServiceAccountKey, now: Timestamp) -> Self {
        let iat = now.as_second();
        Self {
            iss: key.client_email.clone(),
            scope: DRIVE_SCOPE.to_string(),
            aud: key.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_stored(self, now: Timestamp, previous_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: self
                .expires_in
                .and_then(|secs| now.checked_add(SignedDuration::from_secs(secs)).ok()),
        }
    }
}

/// URL the user visits to obtain a `GDRIVE_APP_CODE`
pub fn authorize_url(client_id: &str) -> String {
    let params = [
        ("response_type", "code"),
        ("client_id", client_id),
        ("redirect_uri", OOB_REDIRECT_URI),
        ("scope", DRIVE_SCOPE),
        ("access_type", "offline"),
    ];
    match url::Url::parse_with_params(AUTH_URI, params) {
        Ok(url) => url.to_string(),
        Err(_) => AUTH_URI.to_string(),
    }
}

/// Runs the credential flows against the OAuth token endpoint
pub struct Authenticator {
    http: reqwest::Client,
    token_uri: String,
}

impl Authenticator {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            token_uri: TOKEN_URI.to_string(),
        }
    }

    /// Token endpoint for installed-app exchanges. Service accounts use the
    /// `token_uri` of their key file.
    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    pub async fn authorize(&self, method: &AuthMethod) -> Result<Session> {
        match method {
            AuthMethod::ServiceAccount { key_file, account } => {
                self.service_account(key_file, account).await
            }
            AuthMethod::InstalledApp {
                client_id,
                client_secret,
                token_file,
                code,
            } => {
                self.installed_app(client_id, client_secret, token_file, code.as_deref())
                    .await
            }
        }
    }

    /// Obtain a new access token without any human interaction
    pub async fn refresh(&self, method: &AuthMethod) -> Result<Session> {
        match method {
            AuthMethod::ServiceAccount { key_file, account } => {
                self.service_account(key_file, account).await
            }
            AuthMethod::InstalledApp {
                client_id,
                client_secret,
                token_file,
                ..
            } => match StoredToken::load(token_file)
                .map_err(|e| Error::Auth(format!("cannot refresh app token: {e}")))?
            {
                StoredToken {
                    refresh_token: Some(refresh_token),
                    ..
                } => {
                    let token = self
                        .refresh_app_token(client_id, client_secret, token_file, refresh_token)
                        .await?;
                    Ok(token.session())
                }
                _ => Err(Error::Auth(format!(
                    "App token has no refresh token, set {APP_CODE_ENV} with code from: {}",
                    authorize_url(client_id)
                ))),
            },
        }
    }

    async fn service_account(&self, key_file: &Path, account: &str) -> Result<Session> {
        let content = std::fs::read_to_string(key_file).map_err(|e| {
            Error::Config(format!("cannot read service key {}: {e}", key_file.display()))
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("invalid service key {}: {e}", key_file.display()))
        })?;
        if !key.client_email.eq_ignore_ascii_case(account) {
            return Err(Error::Config(format!(
                "service key {} belongs to {}, not {account}",
                key_file.display(),
                key.client_email
            )));
        }

        let now = Timestamp::now();
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| Error::Config(format!("invalid service key private_key: {e}")))?;
        let assertion = jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &AssertionClaims::new(&key, now),
            &encoding_key,
        )
        .map_err(|e| Error::Auth(format!("sign service account assertion: {e}")))?;

        let token = self
            .token_request(
                &key.token_uri,
                &[("grant_type", JWT_GRANT_TYPE), ("assertion", &assertion)],
            )
            .await?
            .into_stored(now, None);

        tracing::info!(account = %key.client_email, "Authorized by service account");
        Ok(token.session())
    }

    async fn installed_app(
        &self,
        client_id: &str,
        client_secret: &str,
        token_file: &Path,
        code: Option<&str>,
    ) -> Result<Session> {
        let now = Timestamp::now();

        match StoredToken::load(token_file) {
            Ok(token) if !token.is_expired(now) => {
                tracing::info!("Authorized by app token");
                return Ok(token.session());
            }
            Ok(StoredToken {
                refresh_token: Some(refresh_token),
                ..
            }) => {
                let refreshed = self
                    .refresh_app_token(client_id, client_secret, token_file, refresh_token)
                    .await?;
                tracing::info!("Authorized by refreshed app token");
                return Ok(refreshed.session());
            }
            Ok(_) => tracing::info!("App token expired and cannot be refreshed"),
            Err(e) => tracing::info!(error = %e, "Couldn't authenticate with token file"),
        }

        let url = authorize_url(client_id);
        let Some(code) = code else {
            return Err(Error::Auth(format!(
                "Authorization required, set {APP_CODE_ENV} with code from: {url}"
            )));
        };

        let token = match self
            .token_request(
                &self.token_uri,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("client_id", client_id),
                    ("client_secret", client_secret),
                    ("redirect_uri", OOB_REDIRECT_URI),
                ],
            )
            .await
        {
            Ok(response) => response.into_stored(now, None),
            Err(e) => {
                tracing::debug!(error = %e, "Code exchange failed");
                return Err(Error::Auth(format!(
                    "Invalid {APP_CODE_ENV}, update it with code from: {url}"
                )));
            }
        };

        token.save(token_file)?;
        tracing::info!(token_file = %token_file.display(), "Authorized by response code");
        Ok(token.session())
    }

    /// Exchange a refresh token and rewrite the token file
    async fn refresh_app_token(
        &self,
        client_id: &str,
        client_secret: &str,
        token_file: &Path,
        refresh_token: String,
    ) -> Result<StoredToken> {
        let refreshed = self
            .token_request(
                &self.token_uri,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", &refresh_token),
                    ("client_id", client_id),
                    ("client_secret", client_secret),
                ],
            )
            .await?
            .into_stored(Timestamp::now(), Some(refresh_token));
        refreshed.save(token_file)?;
        Ok(refreshed)
    }

    async fn token_request(&self, token_uri: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(token_uri)
            .form(form)
            .send()
            .await
            .map_err(|e| Error::transport("token request", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::transport("token request", e))?;

        if !status.is_success() {
            return Err(Error::Auth(format!(
                "token request failed: HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::Auth(format!("unexpected token response: {e}")))
    }
}

/// The session a [`DriveClient`](crate::DriveClient) signs requests with.
///
/// A refreshable credential renews its token shortly before it expires and
/// once more when the service rejects it. A fixed one never changes.
pub struct Credentials {
    session: Mutex<Session>,
    renewal: Option<(Authenticator, AuthMethod)>,
}

impl Credentials {
    pub fn refreshable(authenticator: Authenticator, method: AuthMethod, session: Session) -> Self {
        Self {
            session: Mutex::new(session),
            renewal: Some((authenticator, method)),
        }
    }

    pub fn fixed(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
            renewal: None,
        }
    }

    /// Current access token, renewed first if it is about to expire
    pub async fn access_token(&self) -> Result<String> {
        let mut session = self.session.lock().await;
        if let Some((authenticator, method)) = &self.renewal
            && session.is_expiring(Timestamp::now())
        {
            tracing::debug!(expires_at = ?session.expires_at(), "Access token expiring, refreshing");
            *session = authenticator.refresh(method).await?;
        }
        Ok(session.access_token().to_string())
    }

    /// Replace a token the service rejected.
    ///
    /// Returns `None` when the credential cannot be renewed. If another
    /// request already replaced `rejected`, the newer token is returned
    /// without another exchange.
    pub async fn renew(&self, rejected: &str) -> Result<Option<String>> {
        let Some((authenticator, method)) = &self.renewal else {
            return Ok(None);
        };
        let mut session = self.session.lock().await;
        if session.access_token() == rejected {
            tracing::info!("Access token rejected, refreshing");
            *session = authenticator.refresh(method).await?;
        }
        Ok(Some(session.access_token().to_string()))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("refreshable", &self.renewal.is_some())
            .finish_non_exhaustive()
    }
}
