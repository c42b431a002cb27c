use serde::{Deserialize, Serialize};

/// Role of a principal.
///
/// Parsed case-insensitively from the names the user service emits
/// (`administrador`, `manicurista`, ...). English spellings are accepted for
/// the non-administrative roles only: the administrator bypass is granted to
/// the service's `administrador` name and nothing else. Anything else is kept verbatim as [`Role::Other`] so role-gated checks can
/// still compare against it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Administrator,
    Manicurist,
    Assistant,
    Client,
    Other(String),
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.to_ascii_lowercase().as_str() {
            "administrador" => Role::Administrator,
            "manicurista" | "manicurist" => Role::Manicurist,
            "asistente" | "assistant" => Role::Assistant,
            "cliente" | "client" => Role::Client,
            _ => Role::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Administrator => "administrador",
            Role::Manicurist => "manicurista",
            Role::Assistant => "asistente",
            Role::Client => "cliente",
            Role::Other(name) => name,
        }
    }

    pub fn is_administrator(&self) -> bool {
        matches!(self, Role::Administrator)
    }

    pub fn is_client(&self) -> bool {
        matches!(self, Role::Client)
    }

    /// Case-insensitive comparison against a required role name.
    pub fn matches(&self, required: &str) -> bool {
        match (self, Role::parse(required)) {
            (Role::Other(have), Role::Other(want)) => have.eq_ignore_ascii_case(&want),
            (have, want) => *have == want,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Role::parse(&value)
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Role::parse(value)
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
