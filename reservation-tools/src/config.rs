use secrecy::Secret;
use service_core::config::{get_env, get_env_parsed};
use service_core::error::AppError;

/// Connection settings shared by the tools. Read from the environment, with
/// `.env` honoured.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub mongodb_uri: Secret<String>,
    pub mongodb_database: String,
    pub use_transactions: bool,
}

impl ToolConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            mongodb_uri: Secret::new(get_env("MONGODB_URI", None, false)?),
            mongodb_database: get_env("MONGODB_DATABASE", None, false)?,
            use_transactions: get_env_parsed("MONGODB_TRANSACTIONS", Some("false"), false)?,
        })
    }
}
