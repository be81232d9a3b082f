//! src/configuration.rs

use secrecy::{ExposeSecret, Secret};
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::{
    postgres::{PgConnectOptions, PgSslMode},
    ConnectOptions,
};

/// Immutable configuration snapshot, read once at process start.
/// Every component borrows the same snapshot for the process lifetime.
#[derive(serde::Deserialize, Debug, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub email: EmailSettings,
    pub chat: ChatSettings,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct ApplicationSettings {
    // Gates the seeding collaborator at process start. Resolved here once
    // so business logic never re-reads the process environment.
    pub seed_on_startup: bool,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct AuthSettings {
    pub secret_key: Secret<String>,
    // Algorithm name as understood by JWT verifiers, e.g. "HS256".
    pub algorithm: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub access_token_expire_minutes: u64,
    pub allowed_domain: String,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct EmailSettings {
    pub ses_region: Option<String>,
    pub ses_access_key: Option<String>,
    pub ses_secret_key: Option<Secret<String>>,
    pub ses_from_email: Option<String>,
    // Provider endpoint override, mainly for tests; when absent the
    // regional endpoint is derived from `ses_region`.
    pub base_url: Option<String>,
    // When set, sends are simulated with a synthetic message id and no
    // network traffic. For test/dev environments.
    pub mock_send: bool,
}

impl EmailSettings {
    /// The email channel is an optional feature of a deployment: it is
    /// considered configured only when every provider credential is present.
    pub fn is_configured(&self) -> bool {
        self.ses_region.is_some()
            && self.ses_access_key.is_some()
            && self.ses_secret_key.is_some()
            && self.ses_from_email.is_some()
    }
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct ChatSettings {
    pub webhook_url: Option<String>,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub database_name: String,
    // Determine if we demand the connection to be encrypted or not
    pub require_ssl: bool,
}

impl DatabaseSettings {
    pub fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            // Try an encrypted connection, fallback to unencrypted if it fails
            PgSslMode::Prefer
        };

        PgConnectOptions::new()
            .host(&self.host)
            .username(&self.username)
            .password(self.password.expose_secret())
            .port(self.port)
            .ssl_mode(ssl_mode)
    }

    pub fn with_db(&self) -> PgConnectOptions {
        let mut options = self.without_db().database(&self.database_name);
        options.log_statements(tracing::log::LevelFilter::Trace);
        options
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let mut settings = config::Config::default();
    let base_path = std::env::current_dir()
        .expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");
    settings.merge(
        config::File::from(configuration_directory.join("base")).required(true),
    )?;
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("Failed to parse APP_ENVIRONMENT");
    settings.merge(
        config::File::from(configuration_directory.join(environment.as_str()))
            .required(true),
    )?;

    // Add in settings from environment variables (with a prefix of APP and '__' as separator)
    // E.g. `APP_AUTH__SECRET_KEY=...` would set `Settings.auth.secret_key`
    settings.merge(config::Environment::with_prefix("app").separator("__"))?;

    settings.try_into()
}

#[derive(Debug)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(a: String) -> Result<Self, Self::Error> {
        match a.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!("{} is not supported environment. Use either 'Local' or 'Production'.", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_names_round_trip() {
        for name in ["local", "production"] {
            let environment: Environment =
                name.to_string().try_into().unwrap();
            assert_eq!(environment.as_str(), name);
        }
    }

    #[test]
    fn unknown_environment_is_rejected() {
        let result: Result<Environment, _> = "staging".to_string().try_into();
        claim::assert_err!(result);
    }

    #[test]
    fn bundled_configuration_files_parse() {
        // Unit tests run from the package root, where `configuration/` lives.
        let settings =
            get_configuration().expect("Failed to read configuration");
        assert_eq!(settings.auth.algorithm, "HS256");
        assert!(!settings.email.is_configured());
    }

    #[test]
    fn email_settings_require_every_credential() {
        let mut settings = EmailSettings {
            ses_region: Some("eu-west-1".into()),
            ses_access_key: Some("AKIATEST".into()),
            ses_secret_key: Some(Secret::new("shhh".into())),
            ses_from_email: Some("noreply@corp.com".into()),
            base_url: None,
            mock_send: false,
        };
        assert!(settings.is_configured());

        settings.ses_from_email = None;
        assert!(!settings.is_configured());
    }
}
