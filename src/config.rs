use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_VAPID_SUBJECT: &str = "mailto:admin@umkm-market.id";
pub const DEFAULT_ORIGIN: &str = "http://localhost:3000";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub origin: String,
    pub vapid_private_key: Option<String>,
    pub vapid_public_key: Option<String>,
    pub vapid_subject: Option<String>,
    pub auth: Option<AuthConfig>,
    pub subscriptions_file: Option<PathBuf>,
    pub webhook_secret: Option<String>,
}

/// Verification settings for bearer tokens issued by the identity service.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            origin: DEFAULT_ORIGIN.to_string(),
            vapid_private_key: None,
            vapid_public_key: None,
            vapid_subject: None,
            auth: None,
            subscriptions_file: None,
            webhook_secret: None,
        }
    }
}
