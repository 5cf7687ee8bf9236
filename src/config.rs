use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Clinseq";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service identity reported in every serialized record
pub const SERVICE_APP_NAME: &str = "NLP Chagas Prediction";
pub const SERVICE_LANGUAGE: &str = "es";
pub const SERVICE_VERSION: &str = "1.0";

/// Environment overrides
pub const MODEL_DIR_ENV: &str = "CLINSEQ_MODEL_DIR";
pub const BIND_ENV: &str = "CLINSEQ_BIND";

pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

/// Name of the bundled model directory under `models_dir()`
const DEFAULT_MODEL_NAME: &str = "lstm-attn";

/// Get the application data directory
/// ~/Clinseq/ on all platforms; falls back to the working directory when
/// no home directory is known (containers, service accounts).
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the models directory
pub fn models_dir() -> PathBuf {
    app_data_dir().join("models")
}

/// Model bundle to load at startup: `$CLINSEQ_MODEL_DIR` or
/// ~/Clinseq/models/lstm-attn
pub fn default_model_dir() -> PathBuf {
    std::env::var_os(MODEL_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| models_dir().join(DEFAULT_MODEL_NAME))
}

/// Listen address: `$CLINSEQ_BIND` or 127.0.0.1:5000
pub fn bind_addr() -> Result<SocketAddr, String> {
    let raw = std::env::var(BIND_ENV).unwrap_or_else(|_| DEFAULT_BIND.to_string());
    raw.parse()
        .map_err(|e| format!("Invalid bind address '{raw}': {e}"))
}

/// Filter used when RUST_LOG is unset
pub fn default_log_filter() -> &'static str {
    "clinseq=info,tower_http=info"
}
