use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tarla_core::config::ContextConfig;
use tarla_core::domain::context::{ContextSnapshot, ContextSource, FarmRecord, WeatherWindow};
use tokio::time::timeout;
use tracing::warn;

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn fetch_window(&self, region: &str, horizon_hours: u32) -> Result<WeatherWindow>;
}

#[async_trait]
pub trait FarmProfileProvider: Send + Sync {
    async fn fetch_record(&self, farm_id: &str) -> Result<FarmRecord>;
}

/// Serves one fixed weather window for every region.
#[derive(Clone, Debug)]
pub struct StaticWeatherProvider {
    window: WeatherWindow,
}

impl StaticWeatherProvider {
    pub fn new(window: WeatherWindow) -> Self {
        Self { window }
    }
}

#[async_trait]
impl WeatherProvider for StaticWeatherProvider {
    async fn fetch_window(&self, _region: &str, horizon_hours: u32) -> Result<WeatherWindow> {
        Ok(WeatherWindow { horizon_hours, ..self.window.clone() })
    }
}

#[derive(Clone, Debug, Default)]
pub struct StaticFarmProfileProvider {
    records: HashMap<String, FarmRecord>,
}

impl StaticFarmProfileProvider {
    pub fn new(records: impl IntoIterator<Item = FarmRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.profile.farm_id.clone(), record))
                .collect(),
        }
    }
}

#[async_trait]
impl FarmProfileProvider for StaticFarmProfileProvider {
    async fn fetch_record(&self, farm_id: &str) -> Result<FarmRecord> {
        self.records
            .get(farm_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no farm profile for `{farm_id}`"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextRequest {
    pub farm_id: String,
    pub region: String,
    pub horizon_hours: u32,
    pub reported_pest: Option<String>,
}

pub const MAX_CACHED_ENTRIES: usize = 1024;
pub const MAX_CACHE_AGE: Duration = Duration::from_secs(6 * 60 * 60);

/// Last-known-good values keyed by region or farm id. Full maps drop their
/// oldest entry; entries older than `max_age` are never served.
struct BoundedCache<V> {
    entries: HashMap<String, CachedValue<V>>,
    capacity: usize,
    max_age: Duration,
    writes: u64,
}

struct CachedValue<V> {
    written: u64,
    stored_at: Instant,
    value: V,
}

impl<V: Clone> BoundedCache<V> {
    fn new(capacity: usize, max_age: Duration) -> Self {
        Self { entries: HashMap::new(), capacity, max_age, writes: 0 }
    }

    fn insert(&mut self, key: &str, value: V) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, cached)| cached.written)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        if self.capacity > 0 {
            self.writes += 1;
            let cached = CachedValue { written: self.writes, stored_at: Instant::now(), value };
            self.entries.insert(key.to_string(), cached);
        }
    }

    fn get(&mut self, key: &str) -> Option<V> {
        let cached = self.entries.get(key)?;
        if cached.stored_at.elapsed() < self.max_age {
            return Some(cached.value.clone());
        }
        self.entries.remove(key);
        None
    }
}

struct LastKnownGood {
    weather: BoundedCache<WeatherWindow>,
    records: BoundedCache<FarmRecord>,
}

impl LastKnownGood {
    fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            weather: BoundedCache::new(capacity, max_age),
            records: BoundedCache::new(capacity, max_age),
        }
    }
}

/// Builds one [`ContextSnapshot`] per turn from the weather and farm-profile
/// providers, fetched concurrently under independent timeouts.
pub struct ContextAssembler {
    weather: Arc<dyn WeatherProvider>,
    profiles: Arc<dyn FarmProfileProvider>,
    weather_timeout: Duration,
    profile_timeout: Duration,
    cache: Mutex<LastKnownGood>,
}

impl ContextAssembler {
    pub fn new(
        weather: Arc<dyn WeatherProvider>,
        profiles: Arc<dyn FarmProfileProvider>,
        weather_timeout: Duration,
        profile_timeout: Duration,
    ) -> Self {
        Self {
            weather,
            profiles,
            weather_timeout,
            profile_timeout,
            cache: Mutex::new(LastKnownGood::new(MAX_CACHED_ENTRIES, MAX_CACHE_AGE)),
        }
    }

    pub fn with_cache_limits(mut self, capacity: usize, max_age: Duration) -> Self {
        self.cache = Mutex::new(LastKnownGood::new(capacity, max_age));
        self
    }

    pub fn from_config(
        weather: Arc<dyn WeatherProvider>,
        profiles: Arc<dyn FarmProfileProvider>,
        config: &ContextConfig,
    ) -> Self {
        Self::new(
            weather,
            profiles,
            Duration::from_millis(config.weather_timeout_ms),
            Duration::from_millis(config.profile_timeout_ms),
        )
    }

    /// Never fails: a source that errors or times out is replaced by its last
    /// known good value, else its default, and marked stale on the snapshot.
    pub async fn assemble(&self, request: &ContextRequest) -> ContextSnapshot {
        let (weather, record) = tokio::join!(
            timeout(
                self.weather_timeout,
                self.weather.fetch_window(&request.region, request.horizon_hours)
            ),
            timeout(self.profile_timeout, self.profiles.fetch_record(&request.farm_id)),
        );

        let mut stale = Vec::new();

        let weather = match flatten(weather, ContextSource::Weather, &request.region) {
            Some(window) => {
                self.with_cache(|cache| {
                    cache.weather.insert(&request.region, window.clone());
                });
                window
            }
            None => {
                stale.push(ContextSource::Weather);
                self.with_cache(|cache| cache.weather.get(&request.region)).unwrap_or(
                    WeatherWindow { horizon_hours: request.horizon_hours, ..WeatherWindow::default() },
                )
            }
        };

        let record = match flatten(record, ContextSource::FarmProfile, &request.farm_id) {
            Some(record) => {
                self.with_cache(|cache| {
                    cache.records.insert(&request.farm_id, record.clone());
                });
                record
            }
            None => {
                stale.push(ContextSource::FarmProfile);
                self.with_cache(|cache| cache.records.get(&request.farm_id))
                    .unwrap_or_else(|| FarmRecord::unspecified(&request.farm_id, &request.region))
            }
        };

        stale
            .into_iter()
            .fold(ContextSnapshot::new(record, weather, Utc::now()), ContextSnapshot::with_stale)
            .with_reported_pest(request.reported_pest.clone())
    }

    fn with_cache<T>(&self, access: impl FnOnce(&mut LastKnownGood) -> T) -> T {
        match self.cache.lock() {
            Ok(mut cache) => access(&mut cache),
            Err(poisoned) => access(&mut poisoned.into_inner()),
        }
    }
}

fn flatten<T>(
    fetched: Result<Result<T>, tokio::time::error::Elapsed>,
    source: ContextSource,
    key: &str,
) -> Option<T> {
    match fetched {
        Ok(Ok(value)) => Some(value),
        Ok(Err(error)) => {
            warn!(
                event_name = "context.fetch_failed",
                source = ?source,
                key = %key,
                error = %error,
                "context source failed, substituting fallback"
            );
            None
        }
        Err(_) => {
            warn!(
                event_name = "context.fetch_timed_out",
                source = ?source,
                key = %key,
                "context source timed out, substituting fallback"
            );
            None
        }
    }
}
