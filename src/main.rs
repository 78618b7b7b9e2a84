use std::path::PathBuf;

use mongocore::connection::{global, install_global};
use mongocore::{ConnectionManager, FatalError, Settings};

const CONFIG_ENV: &str = "MONGOCORE_CONFIG";

fn main() {
    env_logger::init();

    if let Err(err) = run() {
        err.exit();
    }
}

/// Dial the configured deployment and provision every configured index.
fn run() -> Result<(), FatalError> {
    let path = settings_path()?;
    log::info!("loading settings from {}", path.display());
    let settings = Settings::load(&path).map_err(|e| FatalError::config(format!("{e:#}")))?;

    install_global(ConnectionManager::from_settings(&settings)?)?;
    let manager = global()?;
    let session = manager.init_from_settings(&settings)?;

    for spec in &settings.mongodb.indexes {
        session.ensure_index_with(spec, settings.mongodb.duplicate_policy)?;
    }

    log::info!(
        "{} ready with {} indexes provisioned",
        session.database_name(),
        settings.mongodb.indexes.len()
    );
    session.close();
    Ok(())
}

fn settings_path() -> Result<PathBuf, FatalError> {
    if let Some(arg) = std::env::args_os().nth(1) {
        return Ok(PathBuf::from(arg));
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    Settings::default_path().map_err(|e| FatalError::config(format!("{e:#}")))
}
