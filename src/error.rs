use thiserror::Error;

#[derive(Error, Debug)]
pub enum GovmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    Integrity {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("Go {0} is not installed")]
    NotInstalled(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Go {0} is the active version; switch to another version first")]
    ActiveVersion(String),

    #[error("Go {0} is already being installed")]
    AlreadyInstalling(String),

    #[error("{}", version_not_found_message(.query, .installed, .suggestion.as_deref()))]
    VersionNotFound {
        query: String,
        installed: Vec<(String, String)>,
        suggestion: Option<String>,
    },

    #[error("'{query}' matches more than one installed version: {}", format_pairs(.candidates))]
    AmbiguousVersion {
        query: String,
        candidates: Vec<(String, String)>,
    },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Install of Go {0} was cancelled")]
    Cancelled(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

impl GovmError {
    pub fn parse(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a caller may reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Http(_))
    }
}

fn format_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(tag, path)| format!("{}({})", tag, path))
        .collect::<Vec<_>>()
        .join(", ")
}

fn version_not_found_message(
    query: &str,
    installed: &[(String, String)],
    suggestion: Option<&str>,
) -> String {
    let mut msg = if installed.is_empty() {
        format!("Version {} not found, no versions installed", query)
    } else {
        format!(
            "Version {} not found, installed: [{}]",
            query,
            format_pairs(installed)
        )
    };
    if let Some(s) = suggestion {
        msg.push_str(&format!(" (did you mean {}?)", s));
    }
    msg
}

pub type Result<T> = std::result::Result<T, GovmError>;
