//! Weather session orchestration.
//!
//! [`WeatherOrchestrator`] turns user intents into backend calls, coalesces
//! concurrent calls per cache key, caches results, and owns the current
//! [`WeatherSession`]. State changes go out on a broadcast channel as
//! [`OrchestratorEvent`]s.
//!
//! Locks are `parking_lot` mutexes held only for short synchronous sections,
//! never across an `.await`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nimbus_core::Config;
use nimbus_weather::{
    Coordinates, CurrentWeather, FetchError, Forecast, GeolocationProvider, History, LocationKey,
    LocationQuery, TimeBoxedCache, WeatherApi, DEFAULT_TTL,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch, OnceCell};
use tracing::{debug, error, info, warn};

use crate::error::LoadError;
use crate::session::{ErrorDescriptor, LoadIntent, LoadStatus, Notice, Tab, WeatherSession};

const EVENT_CAPACITY: usize = 64;

/// Orchestrator tuning, normally taken from [`Config`].
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Fetch current, forecast and history together instead of per tab.
    pub eager_fetch: bool,
    pub forecast_days: u8,
    pub history_days: u8,
    /// Last step of the "use my location" chain.
    pub default_city: String,
    pub geolocation_timeout: Duration,
    pub cache_ttl: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            eager_fetch: true,
            forecast_days: 5,
            history_days: 3,
            default_city: "London".to_string(),
            geolocation_timeout: Duration::from_secs(10),
            cache_ttl: DEFAULT_TTL,
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            eager_fetch: config.weather.eager_fetch,
            forecast_days: config.weather.forecast_days,
            history_days: config.weather.history_days,
            default_city: config.weather.default_city.clone(),
            geolocation_timeout: config.geolocation_timeout(),
            cache_ttl: config.cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Resource {
    Current,
    Forecast,
    History,
}

/// `(endpoint kind, normalized location, days)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    resource: Resource,
    location: LocationKey,
    days: u8,
}

#[derive(Debug, Clone)]
enum Payload {
    Current(Arc<CurrentWeather>),
    Forecast(Arc<Forecast>),
    History(Arc<History>),
}

#[derive(Debug, Clone)]
struct Stamped {
    payload: Payload,
    fetched_at: DateTime<Utc>,
}

type InFlight = Arc<OnceCell<Result<Stamped, FetchError>>>;

/// Point-in-time view of the orchestrator for renderers.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub status: LoadStatus,
    pub session: Option<Arc<WeatherSession>>,
    pub active_tab: Tab,
    pub error: Option<ErrorDescriptor>,
}

#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    Snapshot(Arc<SessionSnapshot>),
    Notice(Notice),
}

#[derive(Debug, Default)]
struct State {
    session: Option<Arc<WeatherSession>>,
    status: LoadStatus,
    /// Bumped by every top-level intent; a chain step from an older intent
    /// may not claim the target.
    generation: u64,
    /// Key whose results may still be applied.
    target: Option<LocationKey>,
    active_tab: Tab,
    last_error: Option<ErrorDescriptor>,
}

struct Inner {
    api: Arc<dyn WeatherApi>,
    geolocation: Arc<dyn GeolocationProvider>,
    settings: OrchestratorSettings,
    state: Mutex<State>,
    cache: Mutex<TimeBoxedCache<CacheKey, Stamped>>,
    in_flight: Mutex<HashMap<CacheKey, InFlight>>,
    events: broadcast::Sender<OrchestratorEvent>,
}

/// Single owner of the current weather session.
#[derive(Clone)]
pub struct WeatherOrchestrator {
    inner: Arc<Inner>,
}

impl WeatherOrchestrator {
    pub fn new(
        api: Arc<dyn WeatherApi>,
        geolocation: Arc<dyn GeolocationProvider>,
        settings: OrchestratorSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let cache = TimeBoxedCache::new(settings.cache_ttl);

        Self {
            inner: Arc::new(Inner {
                api,
                geolocation,
                settings,
                state: Mutex::new(State::default()),
                cache: Mutex::new(cache),
                in_flight: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.inner.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.inner.events.subscribe()
    }

    pub fn status(&self) -> LoadStatus {
        self.inner.state.lock().status
    }

    pub fn session(&self) -> Option<Arc<WeatherSession>> {
        self.inner.state.lock().session.clone()
    }

    pub fn active_tab(&self) -> Tab {
        self.inner.state.lock().active_tab
    }

    pub fn last_error(&self) -> Option<ErrorDescriptor> {
        self.inner.state.lock().last_error.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.lock();
        SessionSnapshot {
            status: state.status,
            session: state.session.clone(),
            active_tab: state.active_tab,
            error: state.last_error.clone(),
        }
    }

    // ---- Intents ----

    pub async fn load_by_city(&self, city: &str) -> Result<LoadStatus, LoadError> {
        let city = city.trim();
        if city.is_empty() {
            self.emit_notice(Notice::warning(LoadError::EmptyQuery.user_message()));
            return Err(LoadError::EmptyQuery);
        }

        let generation = self.begin_intent();
        self.load_query(
            LocationQuery::city(city),
            LoadIntent::City(city.to_string()),
            true,
            generation,
        )
        .await
    }

    pub async fn load_by_coordinates(&self, lat: f64, lon: f64) -> Result<LoadStatus, LoadError> {
        let generation = self.begin_intent();
        let coords = Coordinates::new(lat, lon);
        self.load_query(
            LocationQuery::Coordinates(coords),
            LoadIntent::Coordinates(coords),
            true,
            generation,
        )
        .await
    }

    pub async fn load_by_ip(&self) -> Result<LoadStatus, LoadError> {
        let generation = self.begin_intent();
        self.load_query(LocationQuery::Ip, LoadIntent::Ip, true, generation)
            .await
    }

    /// Geolocation, then IP lookup, then the default city.
    ///
    /// Each failed step falls through quietly; only the last one surfaces.
    pub async fn use_current_location(&self) -> Result<LoadStatus, LoadError> {
        let generation = self.begin_intent();
        let intent = LoadIntent::CurrentLocation;
        let timeout = self.inner.settings.geolocation_timeout;

        match self.inner.geolocation.position_within(timeout).await {
            Ok(coords) => {
                let query = LocationQuery::Coordinates(coords);
                match self.load_query(query, intent.clone(), false, generation).await {
                    Ok(status) => return Ok(status),
                    Err(LoadError::Superseded) => return Err(LoadError::Superseded),
                    Err(e) => warn!("Weather by coordinates failed, trying IP lookup: {}", e),
                }
            }
            Err(e) => warn!("Geolocation unavailable, trying IP lookup: {}", e),
        }

        if !self.is_current_generation(generation) {
            return Err(LoadError::Superseded);
        }

        self.emit_notice(Notice::info("Using IP location..."));
        match self
            .load_query(LocationQuery::Ip, intent.clone(), false, generation)
            .await
        {
            Ok(status) => return Ok(status),
            Err(LoadError::Superseded) => return Err(LoadError::Superseded),
            Err(e) => warn!("IP lookup failed, using default city: {}", e),
        }

        let city = self.inner.settings.default_city.clone();
        self.load_query(LocationQuery::city(city), intent, true, generation)
            .await
    }

    /// Evicts the session's cache entries and reloads it.
    ///
    /// Without a session this runs [`use_current_location`](Self::use_current_location).
    pub async fn refresh(&self) -> Result<LoadStatus, LoadError> {
        let session = self.session();
        let Some(session) = session else {
            return self.use_current_location().await;
        };

        let removed = {
            let key = &session.key;
            self.inner.cache.lock().clear_matching(|k| &k.location == key)
        };
        debug!("Refresh evicted {} cache entries for {}", removed, session.key);

        let generation = self.begin_intent();
        self.load_query(session.query.clone(), LoadIntent::Refresh, true, generation)
            .await
    }

    /// Switches tab, fetching only the data that tab is missing.
    pub async fn switch_tab(&self, tab: Tab) -> Result<LoadStatus, LoadError> {
        self.inner.state.lock().active_tab = tab;
        self.fill_active_tab().await
    }

    /// Re-issues the intent of the last surfaced failure.
    pub async fn retry(&self) -> Result<LoadStatus, LoadError> {
        let intent = self.inner.state.lock().last_error.as_ref().map(|e| e.intent.clone());
        match intent {
            Some(intent) => {
                info!("Retrying {}", intent);
                self.dispatch(intent).await
            }
            None => Ok(self.status()),
        }
    }

    pub async fn dispatch(&self, intent: LoadIntent) -> Result<LoadStatus, LoadError> {
        match intent {
            LoadIntent::City(city) => self.load_by_city(&city).await,
            LoadIntent::Coordinates(c) => self.load_by_coordinates(c.lat, c.lon).await,
            LoadIntent::Ip => self.load_by_ip().await,
            LoadIntent::CurrentLocation => self.use_current_location().await,
            LoadIntent::Refresh => self.refresh().await,
        }
    }

    // ---- Load procedure ----

    fn begin_intent(&self) -> u64 {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        state.target = None;
        state.generation
    }

    fn is_current_generation(&self, generation: u64) -> bool {
        self.inner.state.lock().generation == generation
    }

    async fn load_query(
        &self,
        query: LocationQuery,
        intent: LoadIntent,
        surface_errors: bool,
        generation: u64,
    ) -> Result<LoadStatus, LoadError> {
        let key = query.key();
        let tab = {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                return Err(LoadError::Superseded);
            }
            state.target = Some(key.clone());
            state.status = state.status.on_start();
            state.active_tab
        };
        self.emit_snapshot();
        info!("Loading weather for {} ({})", key, intent);

        let eager = self.inner.settings.eager_fetch;
        let want_forecast = eager || tab == Tab::Forecast;
        let want_history = eager || tab == Tab::History;

        // `None` until current weather settles, then the installed session key
        // (`Some(None)` when nothing was installed).
        let (installed_tx, installed_rx) = watch::channel(None::<Option<LocationKey>>);

        let current = async {
            let result = self.current(&query).await;
            let outcome = self.apply_current(&key, &query, intent, surface_errors, result);
            let installed = outcome.as_ref().ok().map(|(_, session_key)| session_key.clone());
            let _ = installed_tx.send(Some(installed));
            outcome
        };
        let forecast = async {
            if !want_forecast {
                return;
            }
            let result = self.forecast(&query).await;
            if let Some(session_key) = installed_key(installed_rx.clone()).await {
                if let Err(e) = &result {
                    warn!("Forecast unavailable for {}: {}", session_key, e);
                }
                self.resettle(&session_key, move |s| s.apply_forecast(result));
                self.emit_snapshot();
            }
        };
        let history = async {
            if !want_history {
                return;
            }
            let result = self.history(&query).await;
            if let Some(session_key) = installed_key(installed_rx.clone()).await {
                if let Err(e) = &result {
                    warn!("History unavailable for {}: {}", session_key, e);
                }
                self.resettle(&session_key, move |s| s.apply_history(result));
                self.emit_snapshot();
            }
        };

        let (outcome, (), ()) = tokio::join!(current, forecast, history);
        let (status, session_key) = outcome?;

        // The tab may have changed while the load was in flight.
        if !eager && self.active_tab() != tab {
            return self.fill_active_tab().await;
        }
        Ok(self.status_of(&session_key).unwrap_or(status))
    }

    /// Installs a fresh session from current weather, with forecast and
    /// history pending, and returns its settled status and key.
    fn apply_current(
        &self,
        key: &LocationKey,
        query: &LocationQuery,
        intent: LoadIntent,
        surface_errors: bool,
        current: Result<(Arc<CurrentWeather>, DateTime<Utc>), FetchError>,
    ) -> Result<(LoadStatus, LocationKey), LoadError> {
        let outcome = {
            let mut state = self.inner.state.lock();
            if state.target.as_ref() != Some(key) {
                debug!("Discarding stale result for {}", key);
                return Err(LoadError::Superseded);
            }

            match current {
                Err(e) => {
                    if surface_errors {
                        state.status = state.status.on_current_failed();
                        state.last_error = Some(ErrorDescriptor::new(&e, intent));
                    }
                    Err(e)
                }
                Ok((weather, fetched_at)) => {
                    // IP sessions are keyed and reloaded by the resolved name.
                    let (session_key, session_query) = match query {
                        LocationQuery::Ip => (
                            weather.location.key(),
                            LocationQuery::city(weather.location.name.clone()),
                        ),
                        _ => (key.clone(), query.clone()),
                    };

                    let session = WeatherSession::new(
                        session_key.clone(),
                        session_query,
                        weather.as_ref().clone(),
                        fetched_at,
                    );
                    let status =
                        LoadStatus::settle(&session, state.active_tab, self.inner.settings.eager_fetch);
                    let name = session.location.name.clone();

                    state.session = Some(Arc::new(session));
                    state.status = status;
                    state.last_error = None;
                    Ok((status, session_key, name))
                }
            }
        };

        match outcome {
            Ok((status, session_key, name)) => {
                info!("Weather loaded for {} ({:?})", name, status);
                self.emit_snapshot();
                self.emit_notice(Notice::success(format!("Weather updated for {}", name)));
                Ok((status, session_key))
            }
            Err(e) if surface_errors => {
                error!("Failed to load weather for {}: {}", key, e);
                self.emit_snapshot();
                self.emit_notice(Notice::error(e.user_message()));
                Err(e.into())
            }
            Err(e) => {
                debug!("Quiet failure for {}: {}", key, e);
                Err(e.into())
            }
        }
    }

    /// Status of the session keyed `key`, if it is still the current one.
    fn status_of(&self, key: &LocationKey) -> Option<LoadStatus> {
        let state = self.inner.state.lock();
        state
            .session
            .as_ref()
            .filter(|session| &session.key == key)
            .map(|_| state.status)
    }

    async fn fill_active_tab(&self) -> Result<LoadStatus, LoadError> {
        let (session, tab) = {
            let state = self.inner.state.lock();
            (state.session.clone(), state.active_tab)
        };

        let Some(session) = session else {
            self.emit_snapshot();
            return Ok(self.status());
        };

        if session.has(tab) {
            let status = self.resettle(&session.key, |_| {});
            self.emit_snapshot();
            return Ok(status);
        }

        debug!("Tab {} needs data for {}", tab.as_str(), session.key);
        let status = match tab {
            Tab::Forecast => {
                let result = self.forecast(&session.query).await;
                self.resettle(&session.key, move |s| s.apply_forecast(result))
            }
            Tab::History => {
                let result = self.history(&session.query).await;
                self.resettle(&session.key, move |s| s.apply_history(result))
            }
            Tab::Current => self.status(),
        };

        self.emit_snapshot();
        Ok(status)
    }

    /// Applies `update` to the session if it is still `key`, then recomputes
    /// the status unless a load is in progress or has failed.
    fn resettle<F>(&self, key: &LocationKey, update: F) -> LoadStatus
    where
        F: FnOnce(&mut WeatherSession),
    {
        let mut state = self.inner.state.lock();
        let state = &mut *state;

        let Some(session) = state.session.as_mut() else {
            return state.status;
        };
        if &session.key != key {
            debug!("Session changed from {} while its tab data loaded", key);
            return state.status;
        }

        update(Arc::make_mut(session));

        if state.status.has_data() {
            state.status =
                LoadStatus::settle(session, state.active_tab, self.inner.settings.eager_fetch);
        }
        state.status
    }

    // ---- Coalesced, cached fetches ----

    async fn current(
        &self,
        query: &LocationQuery,
    ) -> Result<(Arc<CurrentWeather>, DateTime<Utc>), FetchError> {
        let key = CacheKey {
            resource: Resource::Current,
            location: query.key(),
            days: 0,
        };
        let api = Arc::clone(&self.inner.api);
        let query = query.clone();

        let stamped = self
            .fetch_coalesced(key, move || async move {
                api.fetch_current(&query)
                    .await
                    .map(|w| Payload::Current(Arc::new(w)))
            })
            .await?;

        match stamped.payload {
            Payload::Current(w) => Ok((w, stamped.fetched_at)),
            other => Err(payload_mismatch(&other)),
        }
    }

    async fn forecast(
        &self,
        query: &LocationQuery,
    ) -> Result<(Forecast, DateTime<Utc>), FetchError> {
        let days = self.inner.settings.forecast_days;
        let key = CacheKey {
            resource: Resource::Forecast,
            location: query.key(),
            days,
        };
        let api = Arc::clone(&self.inner.api);
        let query = query.clone();

        let stamped = self
            .fetch_coalesced(key, move || async move {
                api.fetch_forecast(&query, days)
                    .await
                    .map(|f| Payload::Forecast(Arc::new(f)))
            })
            .await?;

        match stamped.payload {
            Payload::Forecast(f) => Ok((f.as_ref().clone(), stamped.fetched_at)),
            other => Err(payload_mismatch(&other)),
        }
    }

    async fn history(
        &self,
        query: &LocationQuery,
    ) -> Result<(History, DateTime<Utc>), FetchError> {
        let days = self.inner.settings.history_days;
        let key = CacheKey {
            resource: Resource::History,
            location: query.key(),
            days,
        };
        let api = Arc::clone(&self.inner.api);
        let query = query.clone();

        let stamped = self
            .fetch_coalesced(key, move || async move {
                api.fetch_history(&query, days)
                    .await
                    .map(|h| Payload::History(Arc::new(h)))
            })
            .await?;

        match stamped.payload {
            Payload::History(h) => Ok((h.as_ref().clone(), stamped.fetched_at)),
            other => Err(payload_mismatch(&other)),
        }
    }

    /// Cache, then in-flight join, then network.
    ///
    /// At most one fetch per key runs at a time; later callers await the same
    /// cell. A successful result is cached before any waiter sees it.
    async fn fetch_coalesced<F, Fut>(&self, key: CacheKey, fetch: F) -> Result<Stamped, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Payload, FetchError>>,
    {
        let cell = {
            let mut in_flight = self.inner.in_flight.lock();
            if let Some(hit) = self.inner.cache.lock().get(&key) {
                debug!("Cache hit for {:?} {}", key.resource, key.location);
                return Ok(hit);
            }
            Arc::clone(
                in_flight
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let result = cell
            .get_or_init(|| async {
                debug!("Cache miss for {:?} {}, fetching", key.resource, key.location);
                let result = fetch().await.map(|payload| Stamped {
                    payload,
                    fetched_at: Utc::now(),
                });
                if let Ok(stamped) = &result {
                    self.inner.cache.lock().set(key.clone(), stamped.clone());
                }
                result
            })
            .await
            .clone();

        {
            let mut in_flight = self.inner.in_flight.lock();
            if in_flight
                .get(&key)
                .is_some_and(|existing| Arc::ptr_eq(existing, &cell))
            {
                in_flight.remove(&key);
            }
        }

        result
    }

    // ---- Events ----

    fn emit_snapshot(&self) {
        let snapshot = Arc::new(self.snapshot());
        let _ = self.inner.events.send(OrchestratorEvent::Snapshot(snapshot));
    }

    fn emit_notice(&self, notice: Notice) {
        let _ = self.inner.events.send(OrchestratorEvent::Notice(notice));
    }
}

/// Waits for the current-weather step of the same load to settle.
async fn installed_key(
    mut installed: watch::Receiver<Option<Option<LocationKey>>>,
) -> Option<LocationKey> {
    match installed.wait_for(Option::is_some).await {
        Ok(value) => (*value).clone().flatten(),
        Err(_) => None,
    }
}

fn payload_mismatch(payload: &Payload) -> FetchError {
    FetchError::Unknown(format!("unexpected cached payload: {:?}", payload))
}
