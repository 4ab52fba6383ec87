use crate::survey::mailer::{HttpRelayMailer, Mailer, OutboxMailer};
use crate::survey::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_STORE_PATH: &str = "responses.csv";
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

pub const ADMIN_PASSWORD_ENV: &str = "TECHNOSTRESS_ADMIN_PASSWORD";
pub const MAIL_TOKEN_ENV: &str = "TECHNOSTRESS_MAIL_TOKEN";

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    pub required: Option<bool>,
    /// The address the verification emails are sent from.
    pub sender: String,
    #[serde(rename = "relayUrl")]
    pub relay_url: Option<String>,
    #[serde(rename = "outboxPath")]
    pub outbox_path: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurveyConfig {
    #[serde(rename = "storePath")]
    pub store_path: Option<String>,
    #[serde(rename = "adminPassword")]
    pub admin_password: Option<String>,
    #[serde(rename = "lockTimeoutMs")]
    pub lock_timeout_ms: Option<u64>,
    #[serde(rename = "emailVerification")]
    pub email_verification: Option<EmailSettings>,
}

/// The configuration after applying the defaults, the command line and the environment.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Settings {
    pub store_path: PathBuf,
    pub admin_password: Option<String>,
    pub lock_timeout: Duration,
    pub verification_required: bool,
}

/// Optional collaborators, resolved once at startup.
pub struct Capabilities {
    pub mailer: Option<Box<dyn Mailer>>,
}

impl Capabilities {
    pub fn none() -> Capabilities {
        Capabilities { mailer: None }
    }
}

pub fn read_config(path: &str) -> SurveyResult<SurveyConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: SurveyConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

/// Relative paths in the configuration are relative to the directory of the configuration file.
fn resolve_path(root: Option<&Path>, p: &str) -> PathBuf {
    match root {
        Some(r) if Path::new(p).is_relative() => r.join(p),
        _ => PathBuf::from(p),
    }
}

/// Builds the settings.
///
/// `config_dir` is the directory of the configuration file, if any. `store_override`
/// comes from the command line and is taken as is. `admin_password_env` is the value
/// of the `TECHNOSTRESS_ADMIN_PASSWORD` variable, which takes precedence over the file.
pub fn resolve_settings(
    config: &SurveyConfig,
    config_dir: Option<&Path>,
    store_override: Option<&str>,
    admin_password_env: Option<String>,
) -> Settings {
    let store_path = match store_override {
        Some(p) => PathBuf::from(p),
        None => resolve_path(
            config_dir,
            config.store_path.as_deref().unwrap_or(DEFAULT_STORE_PATH),
        ),
    };
    let admin_password = admin_password_env
        .filter(|p| !p.is_empty())
        .or_else(|| config.admin_password.clone());
    let verification_required = config
        .email_verification
        .as_ref()
        .and_then(|e| e.required)
        .unwrap_or(false);
    Settings {
        store_path,
        admin_password,
        lock_timeout: Duration::from_millis(
            config.lock_timeout_ms.unwrap_or(DEFAULT_LOCK_TIMEOUT_MS),
        ),
        verification_required,
    }
}

/// Decides which email sender, if any, is available.
pub fn resolve_capabilities(
    config: &SurveyConfig,
    config_dir: Option<&Path>,
    mail_token: Option<String>,
) -> SurveyResult<Capabilities> {
    let email = match &config.email_verification {
        Some(e) => e,
        None => return Ok(Capabilities::none()),
    };
    let mailer: Box<dyn Mailer> = match (&email.relay_url, &email.outbox_path) {
        (Some(url), None) => {
            let token = mail_token.filter(|t| !t.is_empty());
            if token.is_none() {
                warn!(
                    "resolve_capabilities: {} is not set, the relay is called without credentials",
                    MAIL_TOKEN_ENV
                );
            }
            Box::new(HttpRelayMailer::new(url, &email.sender, token))
        }
        (None, Some(outbox)) => Box::new(OutboxMailer::new(
            resolve_path(config_dir, outbox),
            &email.sender,
        )),
        (Some(_), Some(_)) => {
            return ConfigurationSnafu {
                message: "emailVerification: relayUrl and outboxPath cannot be both set",
            }
            .fail();
        }
        (None, None) => {
            info!("resolve_capabilities: no email sender configured");
            return Ok(Capabilities::none());
        }
    };
    info!("resolve_capabilities: email sender: {}", mailer.describe());
    Ok(Capabilities {
        mailer: Some(mailer),
    })
}
