//! Shared application state.

use crate::config::Config;
use crate::panel::PanelHub;
use std::sync::Arc;
use tracesnoop_core::{PanelDispatcher, SessionLauncher, SessionRegistry};

pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub panel: Arc<PanelHub>,
    pub dispatcher: PanelDispatcher,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config, launcher: impl SessionLauncher + 'static) -> Self {
        let panel = Arc::new(PanelHub::new(config.open_panel_command.clone()));
        let dispatcher = PanelDispatcher::new(panel.clone(), config.retry_delay());

        Self {
            registry: Arc::new(SessionRegistry::new(launcher)),
            panel,
            dispatcher,
            config,
        }
    }
}
