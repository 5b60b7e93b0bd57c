//! Entry point for **gridpoint**.
//!
//! Loads the configuration, runs one navigation session and exits with
//! status 0 after a click or cancel, 1 on any failure.

use gridpoint::config::Config;
use gridpoint::wayland;
use log::{error, info};
use std::path::PathBuf;

/// Resolve the config directory (`$XDG_CONFIG_HOME/gridpoint`).
fn config_dir() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        format!("{}/.config", home)
    });
    PathBuf::from(base).join("gridpoint")
}

/// Load `$XDG_CONFIG_HOME/gridpoint/config.json`.
///
/// A missing file means compiled-in defaults; anything else that goes
/// wrong is fatal.
fn load_config() -> Config {
    let path = config_dir().join("config.json");
    match Config::load(&path) {
        Ok(cfg) => {
            info!("loaded config from {}", path.display());
            cfg
        }
        Err(e) if e.is_not_found() => {
            info!("no config file at {}, using defaults", path.display());
            Config::default()
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn main() {
    env_logger::init();

    let config = load_config();
    if let Err(e) = wayland::run(config) {
        error!("{}", e);
        std::process::exit(1);
    }
}
