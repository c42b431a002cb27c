use serde::{Deserialize, Serialize};

/// Where the route guard sends people, and whether it waits for permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub login_path: String,
    pub password_change_path: String,
    /// Render a loading state instead of the page while permissions load.
    pub block_while_pending: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            password_change_path: "/recuperar-contrasena".to_string(),
            block_while_pending: false,
        }
    }
}

impl GuardConfig {
    pub const LOGIN_PATH_VAR: &'static str = "WINESPA_LOGIN_PATH";
    pub const PASSWORD_CHANGE_PATH_VAR: &'static str = "WINESPA_PASSWORD_CHANGE_PATH";
    pub const BLOCK_WHILE_PENDING_VAR: &'static str = "WINESPA_BLOCK_WHILE_PENDING";

    /// Defaults overridden by `WINESPA_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) over an arbitrary variable source.
    /// Invalid values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(Self::LOGIN_PATH_VAR) {
            match valid_path(&path) {
                Some(path) => config.login_path = path,
                None => tracing::warn!(var = Self::LOGIN_PATH_VAR, value = %path, "ignoring invalid path"),
            }
        }
        if let Some(path) = lookup(Self::PASSWORD_CHANGE_PATH_VAR) {
            match valid_path(&path) {
                Some(path) => config.password_change_path = path,
                None => tracing::warn!(
                    var = Self::PASSWORD_CHANGE_PATH_VAR,
                    value = %path,
                    "ignoring invalid path"
                ),
            }
        }
        if let Some(raw) = lookup(Self::BLOCK_WHILE_PENDING_VAR) {
            match raw.trim().to_ascii_lowercase().parse::<bool>() {
                Ok(block) => config.block_while_pending = block,
                Err(_) => tracing::warn!(
                    var = Self::BLOCK_WHILE_PENDING_VAR,
                    value = %raw,
                    "expected true or false; keeping default"
                ),
            }
        }

        config
    }
}

fn valid_path(raw: &str) -> Option<String> {
    let raw = raw.trim();
    raw.starts_with('/').then(|| raw.to_string())
}
