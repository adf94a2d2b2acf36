//! Web 层共享状态
//!
//! 在启动时把配置和三个外部能力组装成受理器与编排器，
//! 之后以 `Arc<AppState>` 的形式交给每个处理函数。

use std::sync::Arc;

use crate::clients::{DynMailer, DynRelay, DynScoringBackend};
use crate::config::Config;
use crate::orchestrator::{BatchOrchestrator, Intake};
use crate::services::{Notifier, RetryPolicy, Scorer};

pub struct AppState {
    pub config: Arc<Config>,
    pub intake: Intake,
    pub orchestrator: BatchOrchestrator,
}

impl AppState {
    /// 组装共享状态
    pub fn new(
        config: Config,
        backend: DynScoringBackend,
        relay: DynRelay,
        mailer: DynMailer,
    ) -> Self {
        let config = Arc::new(config);
        let scorer = Arc::new(Scorer::new(backend, RetryPolicy::from_config(&config)));
        let notifier = Arc::new(
            Notifier::new(mailer, config.mail_from.clone()).with_app_url(&config.public_base_url),
        );

        let orchestrator = BatchOrchestrator::new(
            &config,
            Arc::clone(&scorer),
            Arc::clone(&relay),
            Arc::clone(&notifier),
        );
        let intake = Intake::new(Arc::clone(&config), scorer, relay, notifier);

        Self {
            config,
            intake,
            orchestrator,
        }
    }
}
