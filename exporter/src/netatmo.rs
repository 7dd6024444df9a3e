//! Netatmo weather-station API: OAuth2 session handling and the
//! `getstationsdata` snapshot.

use crate::config::NetatmoSettings;
use crate::errors::{Error, Result};
use crate::model::{LastMeasure, MeasurementGroup, Module, Place, Station};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const HTTP_TIMEOUT_SECS: u64 = 30;
/// A configured access token this close to expiry is refreshed instead of reused.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;
const STATION_SCOPE: &str = "read_station";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    /// UNIX seconds.
    pub expires_at: i64,
}

impl Token {
    /// The token stored in the settings, if it is complete.
    pub fn from_settings(settings: &NetatmoSettings) -> Option<Self> {
        Some(Self {
            access_token: settings.access_token.clone()?,
            refresh_token: settings.refresh_token.clone()?,
            expires_at: settings.expires_at?,
        })
    }

    pub fn is_valid_at(&self, now: i64) -> bool {
        self.expires_at - TOKEN_EXPIRY_MARGIN_SECS > now
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

/// Authenticated handle on the Netatmo API.
#[derive(Debug, Clone)]
pub struct Session {
    http: reqwest::Client,
    api_url: String,
    token: Token,
}

impl Session {
    /// Reuses a still-valid configured token, otherwise refreshes it, and
    /// falls back to the password grant when no refresh token is known.
    pub async fn authenticate(settings: &NetatmoSettings, now: i64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        let api_url = settings.api_url.trim_end_matches('/').to_string();

        if let Some(token) = Token::from_settings(settings) {
            if token.is_valid_at(now) {
                debug!("Reusing configured access token");
                return Ok(Self {
                    http,
                    api_url,
                    token,
                });
            }
        }

        let form: Vec<(&str, &str)> = match (
            settings.refresh_token.as_deref(),
            settings.username.as_deref(),
            settings.password.as_deref(),
        ) {
            (Some(refresh_token), _, _) => {
                info!("Refreshing Netatmo access token");
                vec![
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", settings.client_id.as_str()),
                    ("client_secret", settings.client_secret.as_str()),
                ]
            }
            (None, Some(username), Some(password)) => {
                info!("Requesting Netatmo access token for {}", username);
                vec![
                    ("grant_type", "password"),
                    ("client_id", settings.client_id.as_str()),
                    ("client_secret", settings.client_secret.as_str()),
                    ("username", username),
                    ("password", password),
                    ("scope", STATION_SCOPE),
                ]
            }
            _ => {
                return Err(Error::Auth(
                    "no refresh token or username/password configured".to_string(),
                ))
            }
        };

        let response = http
            .post(format!("{}/oauth2/token", api_url))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Auth(format!("{}: {}", status, body)));
        }

        let granted: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Auth(format!("invalid token response: {}", e)))?;

        Ok(Self {
            http,
            api_url,
            token: Token {
                access_token: granted.access_token,
                refresh_token: granted.refresh_token,
                expires_at: now + granted.expires_in,
            },
        })
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Fetches every station with its modules and their latest readings.
    pub async fn read(&self) -> Result<Vec<Station>> {
        let response = self
            .http
            .get(format!("{}/api/getstationsdata", self.api_url))
            .bearer_auth(&self.token.access_token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Fetch(format!("{}: {}", status, body)));
        }

        parse_stations(&body)
    }
}

/// Decodes a `getstationsdata` response body.
pub fn parse_stations(body: &str) -> Result<Vec<Station>> {
    let response: StationsDataResponse = serde_json::from_str(body)
        .map_err(|e| Error::Fetch(format!("invalid station data: {}", e)))?;

    Ok(response
        .body
        .devices
        .into_iter()
        .map(ApiDevice::into_station)
        .collect())
}

#[derive(Debug, Deserialize)]
struct StationsDataResponse {
    body: StationsDataBody,
}

#[derive(Debug, Deserialize)]
struct StationsDataBody {
    #[serde(default)]
    devices: Vec<ApiDevice>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiPlace {
    city: Option<String>,
    country: Option<String>,
    timezone: Option<String>,
    /// `[longitude, latitude]`
    #[serde(default)]
    location: Vec<f64>,
    altitude: Option<f64>,
}

impl From<ApiPlace> for Place {
    fn from(place: ApiPlace) -> Self {
        Place {
            city: place.city.unwrap_or_default(),
            country: place.country.unwrap_or_default(),
            timezone: place.timezone.unwrap_or_default(),
            longitude: place.location.first().copied().unwrap_or_default(),
            latitude: place.location.get(1).copied().unwrap_or_default(),
            altitude: place.altitude.unwrap_or_default(),
        }
    }
}

/// The base station. It reports indoor readings itself and lists its
/// linked modules.
#[derive(Debug, Deserialize)]
struct ApiDevice {
    station_name: Option<String>,
    module_name: Option<String>,
    #[serde(default)]
    place: ApiPlace,
    dashboard_data: Option<Dashboard>,
    wifi_status: Option<f64>,
    firmware: Option<f64>,
    reachable: Option<bool>,
    last_status_store: Option<i64>,
    #[serde(default)]
    modules: Vec<ApiModule>,
}

impl ApiDevice {
    fn into_station(self) -> Station {
        let name = self.station_name.unwrap_or_default();
        let mut modules = Vec::with_capacity(self.modules.len() + 1);

        let base_name = self.module_name.unwrap_or_else(|| name.clone());
        let last_measure = self.dashboard_data.as_ref().and_then(|dashboard| {
            let time_utc = dashboard.time_utc?;
            let mut info = MeasurementGroup::new(self.last_status_store.unwrap_or(time_utc));
            info.insert("WifiStatus", self.wifi_status);
            info.insert("Firmware", self.firmware);
            info.insert("Reachable", self.reachable.map(flag));
            Some(LastMeasure {
                info,
                data: dashboard.group(time_utc),
            })
        });
        modules.push(Module {
            name: base_name,
            last_measure,
        });

        modules.extend(self.modules.into_iter().map(ApiModule::into_module));

        Station {
            name,
            place: self.place.into(),
            modules,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiModule {
    module_name: Option<String>,
    #[serde(rename = "_id")]
    id: Option<String>,
    dashboard_data: Option<Dashboard>,
    battery_percent: Option<f64>,
    battery_vp: Option<f64>,
    rf_status: Option<f64>,
    firmware: Option<f64>,
    reachable: Option<bool>,
    last_message: Option<i64>,
}

impl ApiModule {
    fn into_module(self) -> Module {
        let name = self.module_name.or(self.id).unwrap_or_default();
        let last_measure = self.dashboard_data.as_ref().and_then(|dashboard| {
            let time_utc = dashboard.time_utc?;
            let mut info = MeasurementGroup::new(self.last_message.unwrap_or(time_utc));
            info.insert("BatteryPercent", self.battery_percent);
            info.insert("BatteryVP", self.battery_vp);
            info.insert("RFStatus", self.rf_status);
            info.insert("Firmware", self.firmware);
            info.insert("Reachable", self.reachable.map(flag));
            Some(LastMeasure {
                info,
                data: dashboard.group(time_utc),
            })
        });

        Module { name, last_measure }
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[derive(Debug, Deserialize)]
struct Dashboard {
    time_utc: Option<i64>,
    #[serde(rename = "Temperature")]
    temperature: Option<f64>,
    #[serde(rename = "Humidity")]
    humidity: Option<f64>,
    #[serde(rename = "CO2")]
    co2: Option<f64>,
    #[serde(rename = "Noise")]
    noise: Option<f64>,
    #[serde(rename = "Pressure")]
    pressure: Option<f64>,
    #[serde(rename = "AbsolutePressure")]
    absolute_pressure: Option<f64>,
    #[serde(rename = "Rain")]
    rain: Option<f64>,
    sum_rain_1: Option<f64>,
    sum_rain_24: Option<f64>,
    #[serde(rename = "WindAngle")]
    wind_angle: Option<f64>,
    #[serde(rename = "WindStrength")]
    wind_strength: Option<f64>,
    #[serde(rename = "GustAngle")]
    gust_angle: Option<f64>,
    #[serde(rename = "GustStrength")]
    gust_strength: Option<f64>,
    min_temp: Option<f64>,
    max_temp: Option<f64>,
}

impl Dashboard {
    fn group(&self, timestamp: i64) -> MeasurementGroup {
        let mut group = MeasurementGroup::new(timestamp);
        group.insert("Temperature", self.temperature);
        group.insert("Humidity", self.humidity);
        group.insert("CO2", self.co2);
        group.insert("Noise", self.noise);
        group.insert("Pressure", self.pressure);
        group.insert("AbsolutePressure", self.absolute_pressure);
        group.insert("Rain", self.rain);
        group.insert("sum_rain_1", self.sum_rain_1);
        group.insert("sum_rain_24", self.sum_rain_24);
        group.insert("WindAngle", self.wind_angle);
        group.insert("WindStrength", self.wind_strength);
        group.insert("GustAngle", self.gust_angle);
        group.insert("GustStrength", self.gust_strength);
        group.insert("min_temp", self.min_temp);
        group.insert("max_temp", self.max_temp);
        group
    }
}
