//! Credential resolution
//!
//! A [`CredentialChain`] tries its sources in order and signs with the first
//! one that yields credentials:
//!
//! 1. access keys in the environment
//! 2. the `AWS_PROFILE` section of the shared credentials file, then of the
//!    shared config file
//! 3. the container credentials endpoint (task roles)
//! 4. the instance metadata service, token-authenticated (instance roles)
//!
//! Resolved credentials are cached; temporary ones are fetched again shortly
//! before they expire.

use crate::credentials::AwsCredentials;
use crate::error::TelemetryError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable names
pub mod keys {
    pub const PROFILE: &str = "AWS_PROFILE";
    pub const SHARED_CREDENTIALS_FILE: &str = "AWS_SHARED_CREDENTIALS_FILE";
    pub const CONFIG_FILE: &str = "AWS_CONFIG_FILE";
    pub const CONTAINER_RELATIVE_URI: &str = "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI";
    pub const CONTAINER_FULL_URI: &str = "AWS_CONTAINER_CREDENTIALS_FULL_URI";
    pub const CONTAINER_AUTH_TOKEN: &str = "AWS_CONTAINER_AUTHORIZATION_TOKEN";
    pub const METADATA_DISABLED: &str = "AWS_EC2_METADATA_DISABLED";
    pub const METADATA_ENDPOINT: &str = "AWS_EC2_METADATA_SERVICE_ENDPOINT";
    pub const HOME: &str = "HOME";
}

pub const DEFAULT_PROFILE: &str = "default";

const CONTAINER_HOST: &str = "http://169.254.170.2";
const METADATA_HOST: &str = "http://169.254.169.254";
const METADATA_TOKEN_TTL_SECS: &str = "21600";
const ROLE_CREDENTIALS_PATH: &str = "/latest/meta-data/iam/security-credentials/";
const CONTAINER_TIMEOUT: Duration = Duration::from_secs(2);
const METADATA_TIMEOUT: Duration = Duration::from_secs(1);
const REFRESH_MARGIN_MINS: i64 = 5;

type Sections = HashMap<String, HashMap<String, String>>;

/// One place credentials can come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Keys read from the environment when the chain was built
    Environment(AwsCredentials),
    /// Keys handed in by the caller
    Static(AwsCredentials),
    /// Named profile in the shared credentials and config files
    Profile {
        credentials_file: Option<PathBuf>,
        config_file: Option<PathBuf>,
        profile: String,
    },
    /// Container credentials endpoint
    Container { url: String, token: Option<String> },
    /// Instance metadata service
    InstanceMetadata { endpoint: String },
}

impl CredentialSource {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Environment(_) => "environment",
            Self::Static(_) => "static",
            Self::Profile { .. } => "profile",
            Self::Container { .. } => "container",
            Self::InstanceMetadata { .. } => "instance-metadata",
        }
    }

    /// `Ok(None)` when this source has nothing to offer on this host
    async fn load(
        &self,
        http: &reqwest::Client,
    ) -> Result<Option<AwsCredentials>, TelemetryError> {
        match self {
            Self::Environment(creds) | Self::Static(creds) => Ok(Some(creds.clone())),
            Self::Profile {
                credentials_file,
                config_file,
                profile,
            } => load_profile(credentials_file.as_deref(), config_file.as_deref(), profile).await,
            Self::Container { url, token } => load_container(http, url, token.as_deref())
                .await
                .map(Some),
            Self::InstanceMetadata { endpoint } => load_instance_metadata(http, endpoint).await,
        }
    }
}

/// Ordered credential sources with a shared cache
#[derive(Debug, Default)]
pub struct CredentialChain {
    sources: Vec<CredentialSource>,
    cached: Mutex<Option<AwsCredentials>>,
}

impl CredentialChain {
    #[must_use]
    pub fn new(sources: Vec<CredentialSource>) -> Self {
        Self {
            sources,
            cached: Mutex::new(None),
        }
    }

    /// Chain with no sources; every resolution fails
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    #[must_use]
    pub fn fixed(credentials: AwsCredentials) -> Self {
        Self::new(vec![CredentialSource::Static(credentials)])
    }

    /// Default chain from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Default chain from an arbitrary lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut sources = Vec::new();

        if let Some(creds) = AwsCredentials::from_lookup(&lookup) {
            sources.push(CredentialSource::Environment(creds));
        }

        let aws_dir = get(keys::HOME).map(|home| PathBuf::from(home).join(".aws"));
        let credentials_file = get(keys::SHARED_CREDENTIALS_FILE)
            .map(PathBuf::from)
            .or_else(|| aws_dir.as_ref().map(|dir| dir.join("credentials")));
        let config_file = get(keys::CONFIG_FILE)
            .map(PathBuf::from)
            .or_else(|| aws_dir.as_ref().map(|dir| dir.join("config")));
        if credentials_file.is_some() || config_file.is_some() {
            sources.push(CredentialSource::Profile {
                credentials_file,
                config_file,
                profile: get(keys::PROFILE).unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
            });
        }

        let container_url = get(keys::CONTAINER_RELATIVE_URI)
            .map(|path| format!("{CONTAINER_HOST}{path}"))
            .or_else(|| get(keys::CONTAINER_FULL_URI));
        if let Some(url) = container_url {
            sources.push(CredentialSource::Container {
                url,
                token: get(keys::CONTAINER_AUTH_TOKEN),
            });
        }

        let metadata_disabled =
            get(keys::METADATA_DISABLED).is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if !metadata_disabled {
            let endpoint =
                get(keys::METADATA_ENDPOINT).unwrap_or_else(|| METADATA_HOST.to_string());
            sources.push(CredentialSource::InstanceMetadata {
                endpoint: endpoint.trim_end_matches('/').to_string(),
            });
        }

        Self::new(sources)
    }

    #[inline]
    #[must_use]
    pub fn sources(&self) -> &[CredentialSource] {
        &self.sources
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Source names in resolution order
    #[must_use]
    pub fn describe(&self) -> String {
        if self.sources.is_empty() {
            return "none".to_string();
        }
        self.sources
            .iter()
            .map(CredentialSource::name)
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Forget cached credentials; the next resolution asks the sources again
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }

    /// Credentials from the first source that has them
    ///
    /// # Errors
    /// The first source failure when no source produced credentials,
    /// otherwise [`TelemetryError::MissingCredentials`]
    pub async fn resolve(&self, http: &reqwest::Client) -> Result<AwsCredentials, TelemetryError> {
        if let Some(creds) = self.cached_at(Utc::now()) {
            return Ok(creds);
        }

        let mut first_error = None;
        for source in &self.sources {
            match source.load(http).await {
                Ok(Some(creds)) => {
                    tracing::info!("Store credentials resolved from {}", source.name());
                    *self.cached.lock() = Some(creds.clone());
                    return Ok(creds);
                }
                Ok(None) => tracing::debug!("No store credentials from {}", source.name()),
                Err(e) => {
                    tracing::warn!("Credential source {} failed: {}", source.name(), e);
                    first_error.get_or_insert(e);
                }
            }
        }
        Err(first_error.unwrap_or(TelemetryError::MissingCredentials))
    }

    fn cached_at(&self, now: DateTime<Utc>) -> Option<AwsCredentials> {
        let margin = chrono::Duration::minutes(REFRESH_MARGIN_MINS);
        self.cached
            .lock()
            .as_ref()
            .filter(|creds| creds.is_valid_at(now, margin))
            .cloned()
    }
}

async fn load_profile(
    credentials_file: Option<&Path>,
    config_file: Option<&Path>,
    profile: &str,
) -> Result<Option<AwsCredentials>, TelemetryError> {
    if let Some(path) = credentials_file {
        if let Some(sections) = read_ini(path).await? {
            let names = [profile.to_string()];
            if let Some(creds) = profile_credentials(&sections, &names, path)? {
                return Ok(Some(creds));
            }
        }
    }

    if let Some(path) = config_file {
        if let Some(sections) = read_ini(path).await? {
            let mut names = vec![format!("profile {profile}")];
            if profile == DEFAULT_PROFILE {
                names.push(DEFAULT_PROFILE.to_string());
            }
            return profile_credentials(&sections, &names, path);
        }
    }
    Ok(None)
}

async fn read_ini(path: &Path) -> Result<Option<Sections>, TelemetryError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(parse_ini(&text))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(TelemetryError::provider(
            "profile",
            format!("cannot read {}: {e}", path.display()),
        )),
    }
}

fn parse_ini(text: &str) -> Sections {
    let mut sections = Sections::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }
        if let Some(name) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        // Indented lines belong to a nested block under the previous key
        if line.starts_with(char::is_whitespace) {
            continue;
        }
        if let (Some(section), Some((key, value))) = (&current, trimmed.split_once('=')) {
            sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    sections
}

fn profile_credentials(
    sections: &Sections,
    names: &[String],
    path: &Path,
) -> Result<Option<AwsCredentials>, TelemetryError> {
    let Some(section) = names.iter().find_map(|name| sections.get(name)) else {
        return Ok(None);
    };
    let value = |key: &str| section.get(key).filter(|v| !v.is_empty()).cloned();

    let Some(access_key_id) = value("aws_access_key_id") else {
        return Ok(None);
    };
    let secret = value("aws_secret_access_key").ok_or_else(|| {
        TelemetryError::provider(
            "profile",
            format!(
                "{} sets aws_access_key_id without aws_secret_access_key",
                path.display()
            ),
        )
    })?;

    let mut creds = AwsCredentials::new(access_key_id, secret);
    creds.session_token = value("aws_session_token");
    Ok(Some(creds))
}

/// Shared shape of the container and instance metadata responses
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TemporaryCredentials {
    code: Option<String>,
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
    expiration: Option<String>,
}

impl TemporaryCredentials {
    fn into_credentials(self, provider: &'static str) -> Result<AwsCredentials, TelemetryError> {
        if let Some(code) = self.code.as_deref().filter(|c| *c != "Success") {
            return Err(TelemetryError::provider(
                provider,
                format!("credentials not issued: {code}"),
            ));
        }

        let mut creds = AwsCredentials::new(self.access_key_id, self.secret_access_key);
        creds.session_token = self.token;
        if let Some(raw) = self.expiration {
            let expiry = DateTime::parse_from_rfc3339(&raw).map_err(|e| {
                TelemetryError::provider(provider, format!("bad expiration {raw:?}: {e}"))
            })?;
            creds = creds.with_expiry(expiry.with_timezone(&Utc));
        }
        Ok(creds)
    }
}

async fn load_container(
    http: &reqwest::Client,
    url: &str,
    token: Option<&str>,
) -> Result<AwsCredentials, TelemetryError> {
    let fail = |reason: String| TelemetryError::provider("container", reason);

    let mut request = http.get(url).timeout(CONTAINER_TIMEOUT);
    if let Some(token) = token {
        request = request.header("authorization", token);
    }
    let response = request
        .send()
        .await
        .map_err(|e| fail(format!("{url}: {e}")))?;
    let status = response.status();
    if !status.is_success() {
        return Err(fail(format!("{url} returned {status}")));
    }

    let body: TemporaryCredentials = response
        .json()
        .await
        .map_err(|e| fail(format!("cannot decode response: {e}")))?;
    body.into_credentials("container")
}

async fn load_instance_metadata(
    http: &reqwest::Client,
    endpoint: &str,
) -> Result<Option<AwsCredentials>, TelemetryError> {
    let fail = |reason: String| TelemetryError::provider("instance-metadata", reason);

    let token_response = http
        .put(format!("{endpoint}/latest/api/token"))
        .header("x-aws-ec2-metadata-token-ttl-seconds", METADATA_TOKEN_TTL_SECS)
        .timeout(METADATA_TIMEOUT)
        .send()
        .await;
    let token = match token_response {
        Ok(response) if response.status().is_success() => {
            response.text().await.map_err(|e| fail(e.to_string()))?
        }
        Ok(response) => {
            tracing::debug!("Instance metadata token refused: {}", response.status());
            return Ok(None);
        }
        Err(e) => {
            tracing::debug!("Instance metadata service unreachable: {}", e);
            return Ok(None);
        }
    };
    let token = token.trim().to_string();

    let roles_url = format!("{endpoint}{ROLE_CREDENTIALS_PATH}");
    let response = http
        .get(&roles_url)
        .header("x-aws-ec2-metadata-token", &token)
        .timeout(METADATA_TIMEOUT)
        .send()
        .await
        .map_err(|e| fail(e.to_string()))?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        tracing::debug!("No instance role attached");
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(fail(format!("role lookup returned {}", response.status())));
    }
    let roles = response.text().await.map_err(|e| fail(e.to_string()))?;
    let Some(role) = roles.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(None);
    };

    let response = http
        .get(format!("{roles_url}{role}"))
        .header("x-aws-ec2-metadata-token", &token)
        .timeout(METADATA_TIMEOUT)
        .send()
        .await
        .map_err(|e| fail(e.to_string()))?;
    if !response.status().is_success() {
        return Err(fail(format!(
            "credentials for role {role} returned {}",
            response.status()
        )));
    }

    let body: TemporaryCredentials = response
        .json()
        .await
        .map_err(|e| fail(format!("cannot decode response: {e}")))?;
    body.into_credentials("instance-metadata").map(Some)
}
