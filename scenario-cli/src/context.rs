//! Builds the scenario session a command runs against.

use std::rc::Rc;
use std::time::Duration;

use scenario_core::{BuiltinDefaults, FileRemote, HttpRemote, ScenarioError, ScenarioSession};
use tokio::runtime::Runtime;

use crate::config::Config;

/// A session backed by the configured server, or by scenario files under
/// `data_dir` when no server is configured.
///
/// Only a server can run simulations.
pub fn open_session(config: &Config) -> Result<ScenarioSession, ScenarioError> {
    let session = match &config.remote.server_url {
        Some(url) => {
            let remote = Rc::new(
                HttpRemote::new(url.clone(), config.remote.api_key.clone())
                    .with_timeout(Duration::from_secs(config.remote.timeout_secs))?,
            );
            tracing::debug!(server_url = %url, "using scenario server");
            ScenarioSession::new(remote.clone(), remote.clone()).with_simulation(remote)
        }
        None => {
            let data_dir = config.data_dir.value.clone();
            tracing::debug!(data_dir = %data_dir.display(), "using local scenario files");
            ScenarioSession::new(
                Rc::new(FileRemote::new(data_dir)),
                Rc::new(BuiltinDefaults::new()),
            )
        }
    };
    Ok(session.with_default_variant(config.default_variant.value.clone()))
}

/// Sessions are single-threaded, so commands drive them on a
/// current-thread runtime.
pub fn runtime() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}
