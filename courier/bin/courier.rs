#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

use std::path::PathBuf;

use courier::Courier;

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let courier = match find_config_file()? {
        Some(config_path) => {
            let config_content = std::fs::read_to_string(&config_path).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to read config from {}: {}",
                    config_path.display(),
                    e
                )
            })?;
            ron::from_str::<Courier>(&config_content).map_err(|e| {
                anyhow::anyhow!("Invalid config in {}: {}", config_path.display(), e)
            })?
        }
        None => {
            eprintln!("No configuration file found, starting with defaults");
            Courier::default()
        }
    };

    courier.run().await
}

/// Find the configuration file using the following precedence:
/// 1. `COURIER_CONFIG` environment variable
/// 2. ./courier.config.ron (current working directory)
/// 3. /etc/courier/courier.config.ron (system-wide config)
///
/// No file at all is not an error; the caller falls back to defaults.
fn find_config_file() -> anyhow::Result<Option<PathBuf>> {
    if let Ok(env_path) = std::env::var("COURIER_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        anyhow::bail!(
            "COURIER_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    Ok([
        PathBuf::from("./courier.config.ron"),
        PathBuf::from("/etc/courier/courier.config.ron"),
    ]
    .into_iter()
    .find(|path| path.exists()))
}
