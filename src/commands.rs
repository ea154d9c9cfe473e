//! Incoming command handling.
//!
//! The transport layer feeds `(chat_id, sender_name, text)` in and relays
//! the returned reply, nothing more. City capture is a two-state session
//! machine per chat: `Idle -> AwaitingCity -> Idle`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::pipeline::{DeliveryPipeline, RegisterError, RegistrationFlow};
use crate::registry::SubscriberStore;

/// Transient per-chat session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// The next plain-text message is taken as a city name
    AwaitingCity,
}

pub struct CommandHandler {
    sessions: Mutex<HashMap<i64, SessionState>>,
    store: Arc<dyn SubscriberStore>,
    registration: Arc<RegistrationFlow>,
    pipeline: Arc<DeliveryPipeline>,
}

impl CommandHandler {
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        registration: Arc<RegistrationFlow>,
        pipeline: Arc<DeliveryPipeline>,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            store,
            registration,
            pipeline,
        }
    }

    pub fn session_state(&self, chat_id: i64) -> SessionState {
        self.sessions
            .lock()
            .unwrap()
            .get(&chat_id)
            .copied()
            .unwrap_or_default()
    }

    fn set_session(&self, chat_id: i64, state: SessionState) {
        self.sessions.lock().unwrap().insert(chat_id, state);
    }

    /// Handle one incoming message; the returned text is relayed as-is.
    pub async fn handle(
        &self,
        chat_id: i64,
        sender_name: Option<&str>,
        text: &str,
    ) -> Option<String> {
        match text.trim() {
            "/start" => {
                self.set_session(chat_id, SessionState::AwaitingCity);
                let name = self
                    .store
                    .get(chat_id)
                    .and_then(|s| s.display_name)
                    .or_else(|| sender_name.map(str::to_string));
                let greeting = match name {
                    Some(name) => format!("Hi, {}!", name),
                    None => "Hi!".to_string(),
                };
                Some(format!(
                    "{} Which city should I send the daily forecast for?",
                    greeting
                ))
            }
            "/stop" => {
                self.set_session(chat_id, SessionState::Idle);
                self.registration.unregister(chat_id).await;
                Some("Daily forecast disabled. Send /start to subscribe again.".to_string())
            }
            "/now" => {
                match self.store.get(chat_id) {
                    Some(s) if s.subscription_active => {
                        // The delivery itself sends the report (or logs why not)
                        self.pipeline.deliver(chat_id).await;
                        None
                    }
                    _ => Some("You are not subscribed yet. Send /start first.".to_string()),
                }
            }
            city if !city.starts_with('/')
                && self.session_state(chat_id) == SessionState::AwaitingCity =>
            {
                self.register_city(chat_id, sender_name, city).await
            }
            _ => None,
        }
    }

    async fn register_city(
        &self,
        chat_id: i64,
        sender_name: Option<&str>,
        city: &str,
    ) -> Option<String> {
        let display_name = sender_name.map(str::to_string);
        match self.registration.register(chat_id, display_name, city).await {
            Ok(receipt) => {
                self.set_session(chat_id, SessionState::Idle);
                Some(format!(
                    "Done! You will get the weather for {} every day at {}.",
                    receipt.city, receipt.delivers_at
                ))
            }
            // Stay in AwaitingCity so the user can just type another name
            Err(RegisterError::CityNotFound) => Some(format!(
                "I couldn't find \"{}\". Try another city name.",
                city.trim()
            )),
            Err(e) => {
                warn!("Registration for {} failed: {}", chat_id, e);
                Some("The weather service is unavailable right now, please try again later.".to_string())
            }
        }
    }
}
