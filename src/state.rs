use std::sync::Arc;

use crate::{
    config::AppConfig, jobs::reminders::ReminderLedger, notify::Notifier,
    services::access_token::AccessTokenService, store::Repository,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Repository>,
    pub tokens: AccessTokenService,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<AppConfig>,
    pub reminders: Arc<ReminderLedger>,
}

impl AppState {
    pub fn new(store: Arc<dyn Repository>, notifier: Arc<dyn Notifier>, config: AppConfig) -> Self {
        let tokens =
            AccessTokenService::new(&config.access_token_secret, &config.access_tag_secret);
        Self {
            store,
            tokens,
            notifier,
            config: Arc::new(config),
            reminders: Arc::new(ReminderLedger::default()),
        }
    }
}
