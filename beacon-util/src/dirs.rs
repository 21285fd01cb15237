use std::path::PathBuf;

/// Return the application configuration directory
///
/// Stored configs and the device key cache live here.
pub fn config_dir() -> PathBuf {
    let dir = if let Some(config_dir) = dirs::config_dir() {
        config_dir
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
    };
    dir.join(env!("BEACON_PKG_NAME"))
}
