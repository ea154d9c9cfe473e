//! Delivery pipeline and registration flow.
//!
//! A scheduled fire runs `DeliveryPipeline::deliver`: look the subscriber
//! up, fetch a fresh weather snapshot, compose the report plus one
//! prediction, and send it. Every failure path inside a fire terminates in
//! log-and-return; nothing here may propagate and destroy a subscriber's
//! future schedule. The next scheduled fire is the retry boundary.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::predict::PredictionPicker;
use crate::registry::SubscriberStore;
use crate::scheduler::{DailyDeliveryScheduler, DeliverySink};
use crate::timezone::{self, InvalidOffset};
use crate::transport::MessagingTransport;
use crate::weather::{FetchError, WeatherGateway, WeatherSnapshot};

/// Errors surfaced synchronously to the registration caller
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("city not found")]
    CityNotFound,
    #[error(transparent)]
    InvalidOffset(#[from] InvalidOffset),
    #[error("weather provider unavailable: {0}")]
    Gateway(FetchError),
}

impl From<FetchError> for RegisterError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::CityNotFound => RegisterError::CityNotFound,
            other => RegisterError::Gateway(other),
        }
    }
}

/// Confirmation payload for the command layer to relay
#[derive(Debug, Clone)]
pub struct RegistrationReceipt {
    /// Canonical city name from the provider, not the raw input
    pub city: String,
    /// Local delivery time, e.g. "07:00 UTC+2"
    pub delivers_at: String,
}

/// Compose the outbound text from a snapshot and a prediction
pub fn compose_message(snapshot: &WeatherSnapshot, prediction: &str) -> String {
    format!(
        "Weather in {}: {}, {:.1}°C (feels like {:.1}°C)\nPrediction: {}",
        snapshot.city, snapshot.description, snapshot.temperature, snapshot.feels_like, prediction
    )
}

pub struct DeliveryPipeline {
    store: Arc<dyn SubscriberStore>,
    gateway: Arc<dyn WeatherGateway>,
    transport: Arc<dyn MessagingTransport>,
    picker: PredictionPicker,
}

impl DeliveryPipeline {
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        gateway: Arc<dyn WeatherGateway>,
        transport: Arc<dyn MessagingTransport>,
        picker: PredictionPicker,
    ) -> Self {
        Self {
            store,
            gateway,
            transport,
            picker,
        }
    }

    /// Run one delivery attempt. Zero or one outbound message; the
    /// subscriber record is never mutated from here.
    pub async fn deliver(&self, subscriber_id: i64) {
        let subscriber = match self.store.get(subscriber_id) {
            Some(s) if s.subscription_active => s,
            Some(_) => {
                debug!("Subscriber {} is inactive, skipping delivery", subscriber_id);
                return;
            }
            None => {
                debug!("Subscriber {} not found, skipping delivery", subscriber_id);
                return;
            }
        };

        let snapshot = match self.gateway.fetch(&subscriber.city).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    "Weather fetch for {} ({}) failed, skipping today's delivery: {}",
                    subscriber_id, subscriber.city, e
                );
                return;
            }
        };

        let text = compose_message(&snapshot, self.picker.pick());
        match self.transport.send(subscriber.id, &text).await {
            Ok(()) => info!("Delivered daily report to {} ({})", subscriber.id, snapshot.city),
            Err(e) => {
                error!("Delivery to {} failed: {}", subscriber.id, e);
            }
        }
    }
}

#[async_trait]
impl DeliverySink for DeliveryPipeline {
    async fn deliver(&self, subscriber_id: i64) {
        DeliveryPipeline::deliver(self, subscriber_id).await;
    }
}

/// Registration entry point: canonicalize the city through the gateway,
/// resolve the live UTC offset, upsert the record, replace the trigger.
pub struct RegistrationFlow {
    store: Arc<dyn SubscriberStore>,
    gateway: Arc<dyn WeatherGateway>,
    scheduler: Arc<DailyDeliveryScheduler>,
    fire_hour: u32,
    /// One lock per subscriber id, serializing the upsert + trigger swap.
    /// Without it, two concurrent registrations for the same id can commit
    /// in opposite orders in the store and the scheduler, leaving the
    /// surviving trigger bound to a zone that no longer matches the stored
    /// city.
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl RegistrationFlow {
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        gateway: Arc<dyn WeatherGateway>,
        scheduler: Arc<DailyDeliveryScheduler>,
        fire_hour: u32,
    ) -> Self {
        Self {
            store,
            gateway,
            scheduler,
            fire_hour,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn subscriber_lock(&self, subscriber_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap()
            .entry(subscriber_id)
            .or_default()
            .clone()
    }

    /// On `CityNotFound` the subscriber is not created and no trigger is
    /// scheduled; the caller relays the error to the user for a retry.
    pub async fn register(
        &self,
        subscriber_id: i64,
        display_name: Option<String>,
        raw_city: &str,
    ) -> Result<RegistrationReceipt, RegisterError> {
        // The weather lookup runs outside the lock; only the commit is
        // serialized per subscriber.
        let snapshot = self.gateway.fetch(raw_city).await?;
        let time_zone = timezone::resolve(snapshot.utc_offset_seconds)?;

        let lock = self.subscriber_lock(subscriber_id);
        let _guard = lock.lock().await;

        let subscriber = self.store.upsert(
            subscriber_id,
            display_name,
            snapshot.city.clone(),
            time_zone,
        );
        self.scheduler.schedule(&subscriber);

        info!(
            "Registered {} for {} ({})",
            subscriber_id, subscriber.city, time_zone
        );
        Ok(RegistrationReceipt {
            city: subscriber.city,
            delivers_at: format!("{:02}:00 {}", self.fire_hour, time_zone),
        })
    }

    /// Cancel the trigger and deactivate the record. Idempotent.
    pub async fn unregister(&self, subscriber_id: i64) {
        let lock = self.subscriber_lock(subscriber_id);
        let _guard = lock.lock().await;

        self.scheduler.cancel(subscriber_id);
        self.store.deactivate(subscriber_id);
        info!("Unregistered {}", subscriber_id);
    }
}
