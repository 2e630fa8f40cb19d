//! The dashboard facade.
//!
//! [`Dashboard`] owns the orchestrator, the presentation store and the
//! preference store, and forwards every state change to a [`ViewRenderer`]
//! from a background task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use nimbus_core::Config;
use nimbus_weather::{GeolocationProvider, LocationQuery, UnitSystem, WeatherApi};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::display::DashboardView;
use crate::error::LoadError;
use crate::orchestrator::{OrchestratorEvent, OrchestratorSettings, WeatherOrchestrator};
use crate::preferences::{PrefKey, PreferenceStore};
use crate::presentation::{PresentationState, PresentationStateStore, Theme};
use crate::session::{LoadStatus, Notice, Tab};

const PERMISSION_GRANTED: &str = "granted";
const PERMISSION_DENIED: &str = "denied";

/// Consumer of derived views and toasts.
///
/// Called from a background task, so implementations must be cheap and must
/// not block.
pub trait ViewRenderer: Send + Sync {
    fn render(&self, view: &DashboardView);

    fn notify(&self, notice: &Notice);

    /// First visit with no stored location choice.
    fn prompt_location_permission(&self) {}
}

pub struct Dashboard {
    orchestrator: WeatherOrchestrator,
    presentation: Arc<PresentationStateStore>,
    prefs: Arc<dyn PreferenceStore>,
    renderer: Arc<dyn ViewRenderer>,
    default_city: String,
    stale_after: chrono::Duration,
    forwarder: JoinHandle<()>,
}

impl Dashboard {
    /// Wires the components and starts forwarding views. Issues no requests.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: &Config,
        api: Arc<dyn WeatherApi>,
        geolocation: Arc<dyn GeolocationProvider>,
        prefs: Arc<dyn PreferenceStore>,
        renderer: Arc<dyn ViewRenderer>,
    ) -> Self {
        let presentation = Arc::new(PresentationStateStore::load(
            Arc::clone(&prefs),
            config.ui.prefer_dark,
        ));
        let orchestrator =
            WeatherOrchestrator::new(api, geolocation, OrchestratorSettings::from_config(config));

        let forwarder = spawn_forwarder(
            orchestrator.clone(),
            Arc::clone(&presentation),
            Arc::clone(&renderer),
        );

        Self {
            orchestrator,
            presentation,
            prefs,
            renderer,
            default_city: config.weather.default_city.clone(),
            stale_after: chrono::Duration::minutes(i64::from(config.weather.stale_after_minutes)),
            forwarder,
        }
    }

    /// [`new`](Self::new) followed by [`start`](Self::start).
    ///
    /// A failed initial load is already surfaced to the renderer and does not
    /// fail construction.
    pub async fn initialize(
        config: &Config,
        api: Arc<dyn WeatherApi>,
        geolocation: Arc<dyn GeolocationProvider>,
        prefs: Arc<dyn PreferenceStore>,
        renderer: Arc<dyn ViewRenderer>,
    ) -> Self {
        let dashboard = Self::new(config, api, geolocation, prefs, renderer);
        if let Err(e) = dashboard.start().await {
            warn!("Initial load did not complete: {}", e);
        }
        dashboard
    }

    /// Initial load, following the stored location permission.
    #[instrument(skip(self), level = "info")]
    pub async fn start(&self) -> Result<LoadStatus, LoadError> {
        let tab = self.presentation.snapshot().active_tab;
        // No session yet, so this only records the tab.
        self.orchestrator.switch_tab(tab).await?;

        let permission = self.prefs.get_or_warn(PrefKey::LocationPermission);
        let first_visit = self.prefs.get_or_warn(PrefKey::AppVisited).is_none();
        if first_visit {
            self.prefs.set_or_warn(PrefKey::AppVisited, "true");
        }

        match permission.as_deref() {
            Some(PERMISSION_GRANTED) => return self.use_my_location().await,
            None if first_visit => {
                info!("First visit, asking for location permission");
                self.renderer.prompt_location_permission();
                return self.load_default_city().await;
            }
            _ => {}
        }

        match self.presentation.snapshot().last_location {
            Some(saved) => {
                debug!("Restoring last location {:?}", saved);
                match self.load_query(saved_query(&saved)).await {
                    Err(LoadError::Fetch(e)) => {
                        warn!("Last location {:?} failed ({}), using default city", saved, e);
                        self.load_default_city().await
                    }
                    other => other,
                }
            }
            None => self.load_default_city().await,
        }
    }

    pub fn orchestrator(&self) -> &WeatherOrchestrator {
        &self.orchestrator
    }

    pub fn presentation(&self) -> PresentationState {
        self.presentation.snapshot()
    }

    /// The view as it would be rendered now.
    pub fn view(&self) -> DashboardView {
        DashboardView::build(&self.orchestrator.snapshot(), &self.presentation.snapshot())
    }

    // ---- Loads ----

    pub async fn search(&self, city: &str) -> Result<LoadStatus, LoadError> {
        let result = self.orchestrator.load_by_city(city).await;
        self.after_load(result)
    }

    pub async fn use_my_location(&self) -> Result<LoadStatus, LoadError> {
        let result = self.orchestrator.use_current_location().await;
        self.after_load(result)
    }

    pub async fn refresh(&self) -> Result<LoadStatus, LoadError> {
        let result = self.orchestrator.refresh().await;
        self.after_load(result)
    }

    pub async fn retry(&self) -> Result<LoadStatus, LoadError> {
        let result = self.orchestrator.retry().await;
        self.after_load(result)
    }

    pub async fn switch_tab(&self, tab: Tab) -> Result<LoadStatus, LoadError> {
        self.presentation.set_active_tab(tab);
        self.orchestrator.switch_tab(tab).await
    }

    pub async fn grant_location_permission(&self) -> Result<LoadStatus, LoadError> {
        self.prefs
            .set_or_warn(PrefKey::LocationPermission, PERMISSION_GRANTED);
        self.use_my_location().await
    }

    pub async fn deny_location_permission(&self) -> Result<LoadStatus, LoadError> {
        self.prefs
            .set_or_warn(PrefKey::LocationPermission, PERMISSION_DENIED);
        self.load_default_city().await
    }

    /// Refreshes when the last successful load is older than the configured
    /// staleness window. Returns `None` when nothing was reloaded.
    pub async fn refresh_if_stale(&self) -> Result<Option<LoadStatus>, LoadError> {
        if self.orchestrator.session().is_none() {
            return Ok(None);
        }
        let Some(last_update) = self.last_update() else {
            return Ok(None);
        };

        let age = Utc::now() - last_update;
        if age <= self.stale_after {
            debug!("Data is {}s old, not refreshing", age.num_seconds());
            return Ok(None);
        }

        info!("Data is {} minutes old, refreshing", age.num_minutes());
        self.refresh().await.map(Some)
    }

    pub async fn on_connectivity_restored(&self) -> Result<Option<LoadStatus>, LoadError> {
        self.renderer.notify(&Notice::success("Connection restored"));
        if self.orchestrator.session().is_none() {
            return Ok(None);
        }
        self.refresh().await.map(Some)
    }

    pub fn on_connectivity_lost(&self) {
        self.renderer.notify(&Notice::warning(
            "Connection lost. Some features may not work.",
        ));
    }

    // ---- Presentation ----

    pub fn set_unit(&self, unit: UnitSystem) {
        self.presentation.set_unit(unit);
    }

    pub fn set_theme(&self, theme: Theme) {
        self.presentation.set_theme(theme);
    }

    pub fn toggle_theme(&self) -> Theme {
        self.presentation.toggle_theme()
    }

    // ---- Internals ----

    async fn load_default_city(&self) -> Result<LoadStatus, LoadError> {
        let result = self.orchestrator.load_by_city(&self.default_city).await;
        self.after_load(result)
    }

    async fn load_query(&self, query: LocationQuery) -> Result<LoadStatus, LoadError> {
        let result = match query {
            LocationQuery::City(city) => self.orchestrator.load_by_city(&city).await,
            LocationQuery::Coordinates(c) => self.orchestrator.load_by_coordinates(c.lat, c.lon).await,
            LocationQuery::Ip => self.orchestrator.load_by_ip().await,
        };
        self.after_load(result)
    }

    /// Persists the displayed location and the update time after a load.
    fn after_load(
        &self,
        result: Result<LoadStatus, LoadError>,
    ) -> Result<LoadStatus, LoadError> {
        if let Ok(status) = &result {
            if status.has_data() {
                if let Some(session) = self.orchestrator.session() {
                    self.presentation
                        .set_last_location(&session.query.as_city_param());
                }
                self.prefs
                    .set_or_warn(PrefKey::LastUpdate, &Utc::now().to_rfc3339());
            }
        }
        result
    }

    fn last_update(&self) -> Option<DateTime<Utc>> {
        let raw = self.prefs.get_or_warn(PrefKey::LastUpdate)?;
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(e) => {
                debug!("Ignoring unparsable last update {:?}: {}", raw, e);
                None
            }
        }
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Parses a saved location: `"lat,lon"` becomes coordinates, anything else a
/// city name.
pub fn saved_query(saved: &str) -> LocationQuery {
    if let Some((lat, lon)) = saved.split_once(',') {
        if let (Ok(lat), Ok(lon)) = (lat.trim().parse::<f64>(), lon.trim().parse::<f64>()) {
            if lat.is_finite() && lon.is_finite() {
                return LocationQuery::coordinates(lat, lon);
            }
        }
    }
    LocationQuery::city(saved.trim())
}

fn spawn_forwarder(
    orchestrator: WeatherOrchestrator,
    presentation: Arc<PresentationStateStore>,
    renderer: Arc<dyn ViewRenderer>,
) -> JoinHandle<()> {
    let mut events = orchestrator.subscribe();
    let mut changes = presentation.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(OrchestratorEvent::Snapshot(snapshot)) => {
                        renderer.render(&DashboardView::build(&snapshot, &presentation.snapshot()));
                    }
                    Ok(OrchestratorEvent::Notice(notice)) => renderer.notify(&notice),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("View forwarder skipped {} orchestrator events", skipped);
                        renderer.render(&DashboardView::build(
                            &orchestrator.snapshot(),
                            &presentation.snapshot(),
                        ));
                    }
                    Err(RecvError::Closed) => break,
                },
                change = changes.recv() => match change {
                    Ok(state) => {
                        renderer.render(&DashboardView::build(&orchestrator.snapshot(), &state));
                    }
                    Err(RecvError::Lagged(_)) => {
                        renderer.render(&DashboardView::build(
                            &orchestrator.snapshot(),
                            &presentation.snapshot(),
                        ));
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("View forwarder stopped");
    })
}
