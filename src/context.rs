use std::sync::Arc;

use crate::adapters;
use crate::config::AppConfig;
use crate::core::notifications::{Notifier, create_channel};
use crate::core::{MeteredConnection, NetworkProbe, SpeedTester};

/// Everything a run needs, passed explicitly instead of living in globals.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub notifier: Notifier,
    pub probe: Arc<dyn NetworkProbe>,
    pub metered: Arc<dyn MeteredConnection>,
    pub speed_test: Arc<dyn SpeedTester>,
}

impl AppContext {
    /// Wire up the production collaborators selected by `config`.
    pub fn new(config: AppConfig) -> Self {
        Self {
            notifier: Notifier::new(create_channel(&config)),
            probe: adapters::create_probe(&config),
            metered: adapters::create_metered_detector(),
            speed_test: adapters::create_speed_tester(&config),
            config: Arc::new(config),
        }
    }

    pub fn with_collaborators(
        config: AppConfig,
        notifier: Notifier,
        probe: Arc<dyn NetworkProbe>,
        metered: Arc<dyn MeteredConnection>,
        speed_test: Arc<dyn SpeedTester>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            notifier,
            probe,
            metered,
            speed_test,
        }
    }
}
