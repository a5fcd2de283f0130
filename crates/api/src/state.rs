//! Shared application state

use std::sync::Arc;

use crate::auth::AuthResolver;
use crate::websocket::{ChatContext, PumpSettings};

/// State handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub chat: ChatContext,
    pub auth: Arc<AuthResolver>,
    pub pump_settings: PumpSettings,
}

impl AppState {
    pub fn new(chat: ChatContext, auth: Arc<AuthResolver>, pump_settings: PumpSettings) -> Self {
        Self {
            chat,
            auth,
            pump_settings,
        }
    }
}
