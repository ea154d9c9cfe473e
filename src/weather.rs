//! Weather data gateway.
//!
//! The core consumes weather through the `WeatherGateway` trait; the
//! production implementation talks to the OpenWeatherMap current-weather
//! endpoint. A snapshot is fetched fresh on every delivery attempt and
//! never cached.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;

const OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// A point-in-time weather reading, produced fresh per delivery attempt
#[derive(Debug, Clone)]
pub struct WeatherSnapshot {
    /// Canonical city name as reported by the provider
    pub city: String,
    pub description: String,
    pub temperature: f64,
    pub feels_like: f64,
    /// Live UTC offset of the city, in seconds
    pub utc_offset_seconds: i32,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("city not found")]
    CityNotFound,
    #[error("weather request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("weather provider returned status {0}")]
    Provider(u16),
}

#[async_trait]
pub trait WeatherGateway: Send + Sync {
    async fn fetch(&self, city: &str) -> Result<WeatherSnapshot, FetchError>;
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    name: String,
    timezone: i32,
    #[serde(default)]
    weather: Vec<OwmCondition>,
    main: OwmMain,
}

#[derive(Debug, Deserialize)]
struct OwmCondition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    feels_like: f64,
}

pub struct OpenWeatherGateway {
    client: reqwest::Client,
    api_key: String,
    units: String,
    lang: String,
}

impl OpenWeatherGateway {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        // Bounded timeout so a hung provider call cannot accumulate
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.weather_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: config.openweather_token.clone(),
            units: config.units.clone(),
            lang: config.lang.clone(),
        })
    }
}

#[async_trait]
impl WeatherGateway for OpenWeatherGateway {
    async fn fetch(&self, city: &str) -> Result<WeatherSnapshot, FetchError> {
        debug!("Fetching weather for \"{}\"", city);

        let response = self
            .client
            .get(OPENWEATHER_URL)
            .query(&[
                ("q", city),
                ("appid", self.api_key.as_str()),
                ("units", self.units.as_str()),
                ("lang", self.lang.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::CityNotFound);
        }
        if !status.is_success() {
            return Err(FetchError::Provider(status.as_u16()));
        }

        let body: OwmResponse = response.json().await?;
        let description = body
            .weather
            .first()
            .map(|c| c.description.clone())
            .unwrap_or_else(|| "no description".to_string());

        Ok(WeatherSnapshot {
            city: body.name,
            description,
            temperature: body.main.temp,
            feels_like: body.main.feels_like,
            utc_offset_seconds: body.timezone,
            fetched_at: Utc::now(),
        })
    }
}
