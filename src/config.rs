use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_MAX_EXTRACTED_MB: u64 = 512;
const DEFAULT_MAX_ENTRIES: u64 = 10_000;
const DEFAULT_UPLOAD_MAX_SIZE_MB: u64 = 50;
const DEFAULT_UPLOAD_MAX_AGE_SECS: u64 = 3600;
const DEFAULT_VALIDATION_TIMEOUT_SECS: u64 = 60;
const DEFAULT_PORT: u16 = 5000;
const BYTES_PER_MB: u64 = 1024 * 1024;

/// Limits and placement for validation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Ceiling on total uncompressed bytes written into one workspace.
    pub max_extracted_bytes: u64,
    /// Ceiling on archive members, directories included.
    pub max_entries: usize,
    /// Parent directory under which each run creates its own workspace.
    pub workspace_root: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_extracted_bytes: DEFAULT_MAX_EXTRACTED_MB * BYTES_PER_MB,
            max_entries: DEFAULT_MAX_ENTRIES as usize,
            workspace_root: std::env::temp_dir(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let max_extracted_mb =
            read_positive_u64("SHAPECHECK_MAX_EXTRACTED_MB", DEFAULT_MAX_EXTRACTED_MB);
        let max_entries = read_positive_u64("SHAPECHECK_MAX_ENTRIES", DEFAULT_MAX_ENTRIES);
        let workspace_root = std::env::var("SHAPECHECK_WORKSPACE_DIR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);

        Self {
            max_extracted_bytes: max_extracted_mb.saturating_mul(BYTES_PER_MB),
            max_entries: usize::try_from(max_entries).unwrap_or(usize::MAX),
            workspace_root,
        }
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub upload_dir: PathBuf,
    pub max_upload_size: u64,
    pub max_upload_size_label: String,
    pub upload_max_age: Duration,
    pub validation_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let max_upload_size = DEFAULT_UPLOAD_MAX_SIZE_MB * BYTES_PER_MB;
        Self {
            port: DEFAULT_PORT,
            upload_dir: PathBuf::from("./uploads"),
            max_upload_size,
            max_upload_size_label: format_bytes(max_upload_size),
            upload_max_age: Duration::from_secs(DEFAULT_UPLOAD_MAX_AGE_SECS),
            validation_timeout: Duration::from_secs(DEFAULT_VALIDATION_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let (max_upload_size, max_upload_size_label) = read_max_size_config();
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string());

        Self {
            port,
            upload_dir: PathBuf::from(upload_dir),
            max_upload_size,
            max_upload_size_label,
            upload_max_age: Duration::from_secs(read_positive_u64(
                "UPLOAD_MAX_AGE_SECS",
                DEFAULT_UPLOAD_MAX_AGE_SECS,
            )),
            validation_timeout: Duration::from_secs(read_positive_u64(
                "VALIDATION_TIMEOUT_SECS",
                DEFAULT_VALIDATION_TIMEOUT_SECS,
            )),
        }
    }
}

pub fn read_max_size_config() -> (u64, String) {
    let max_size_mb = read_positive_u64("UPLOAD_MAX_SIZE_MB", DEFAULT_UPLOAD_MAX_SIZE_MB);
    let bytes = max_size_mb.saturating_mul(BYTES_PER_MB);
    (bytes, format_bytes(bytes))
}

fn read_positive_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

/// Largest binary unit that divides `bytes` exactly: `50MB`, `1536B`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [(u64, &str); 3] = [(1 << 30, "GB"), (1 << 20, "MB"), (1 << 10, "KB")];

    UNITS
        .iter()
        .find(|(size, _)| bytes >= *size && bytes % size == 0)
        .map(|(size, suffix)| format!("{}{}", bytes / size, suffix))
        .unwrap_or_else(|| format!("{}B", bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    #[test]
    fn format_bytes_picks_largest_exact_unit() {
        assert_eq!(format_bytes(50 * 1024 * 1024), "50MB");
        assert_eq!(format_bytes(2 * 1024 * 1024 * 1024), "2GB");
        assert_eq!(format_bytes(1536), "1536B");
        assert_eq!(format_bytes(2048), "2KB");
        assert_eq!(format_bytes(100), "100B");
        assert_eq!(format_bytes(0), "0B");
        assert_eq!(format_bytes(1 << 40), "1024GB");
    }

    #[test]
    fn read_max_size_config_default_and_custom() {
        let _guard = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock");

        std::env::remove_var("UPLOAD_MAX_SIZE_MB");
        let (bytes, label) = read_max_size_config();
        assert_eq!(bytes, 50 * BYTES_PER_MB);
        assert_eq!(label, "50MB");

        std::env::set_var("UPLOAD_MAX_SIZE_MB", "12");
        let (bytes, label) = read_max_size_config();
        assert_eq!(bytes, 12 * BYTES_PER_MB);
        assert_eq!(label, "12MB");

        std::env::set_var("UPLOAD_MAX_SIZE_MB", "0");
        assert_eq!(read_max_size_config().1, "50MB");

        std::env::set_var("UPLOAD_MAX_SIZE_MB", "nope");
        assert_eq!(read_max_size_config().1, "50MB");
        std::env::remove_var("UPLOAD_MAX_SIZE_MB");
    }

    #[test]
    fn engine_config_reads_limits_from_env() {
        let _guard = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock");

        std::env::remove_var("SHAPECHECK_WORKSPACE_DIR");
        std::env::set_var("SHAPECHECK_MAX_EXTRACTED_MB", "3");
        std::env::set_var("SHAPECHECK_MAX_ENTRIES", "7");
        let config = EngineConfig::from_env();
        assert_eq!(config.max_extracted_bytes, 3 * BYTES_PER_MB);
        assert_eq!(config.max_entries, 7);

        std::env::remove_var("SHAPECHECK_MAX_EXTRACTED_MB");
        std::env::remove_var("SHAPECHECK_MAX_ENTRIES");
        assert_eq!(EngineConfig::from_env(), EngineConfig::default());
    }
}
