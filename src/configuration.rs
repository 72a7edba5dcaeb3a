use crate::error::ConfigError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    pub identity: IdentitySettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Access/refresh token settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    /// HMAC-SHA256 signing secret. Left empty when unset so the signer can
    /// refuse to start.
    #[serde(default)]
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_expiry_minutes: i64, // e.g. 15
    pub refresh_token_expiry_days: i64,   // e.g. 7
}

/// Account lockout policy enforced by the identity store
#[derive(serde::Deserialize, Clone)]
pub struct IdentitySettings {
    pub max_failed_attempts: i32,
    pub lockout_minutes: i64,
    #[serde(default)]
    pub require_confirmed_email: bool,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_minutes: 15,
            require_confirmed_email: false,
        }
    }
}

/// Reads `configuration.yaml` (if present) and overlays `APP_*` environment
/// variables, e.g. `APP_JWT__SECRET`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    let settings = settings.try_deserialize::<Settings>()?;

    if settings.jwt.access_token_expiry_minutes <= 0 {
        return Err(ConfigError::InvalidValue(
            "jwt.access_token_expiry_minutes must be positive".to_string(),
        ));
    }
    if settings.jwt.refresh_token_expiry_days <= 0 {
        return Err(ConfigError::InvalidValue(
            "jwt.refresh_token_expiry_days must be positive".to_string(),
        ));
    }

    Ok(settings)
}
