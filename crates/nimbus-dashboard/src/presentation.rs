//! Presentation preferences: unit, theme, active tab and last location.
//!
//! Every setter updates memory, persists through the [`PreferenceStore`], and
//! notifies subscribers. Nothing here touches the network.

use std::str::FromStr;
use std::sync::Arc;

use nimbus_weather::UnitSystem;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::preferences::{PrefKey, PreferenceStore};
use crate::session::Tab;

const SUBSCRIBER_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(format!("unknown theme: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PresentationState {
    pub unit: UnitSystem,
    pub theme: Theme,
    pub active_tab: Tab,
    /// Saved form of the last displayed location (city name or "lat,lon").
    pub last_location: Option<String>,
}

pub struct PresentationStateStore {
    state: Mutex<PresentationState>,
    prefs: Arc<dyn PreferenceStore>,
    tx: broadcast::Sender<PresentationState>,
}

fn parse_pref<T: FromStr>(prefs: &dyn PreferenceStore, key: PrefKey) -> Option<T> {
    let raw = prefs.get_or_warn(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::debug!("Ignoring unparsable {} = {:?}", key.as_str(), raw);
            None
        }
    }
}

impl PresentationStateStore {
    /// Reads the initial state once. `prefer_dark` is the system theme hint.
    pub fn load(prefs: Arc<dyn PreferenceStore>, prefer_dark: bool) -> Self {
        let system_theme = if prefer_dark { Theme::Dark } else { Theme::Light };

        let state = PresentationState {
            unit: parse_pref(prefs.as_ref(), PrefKey::Unit).unwrap_or_default(),
            theme: parse_pref(prefs.as_ref(), PrefKey::Theme).unwrap_or(system_theme),
            active_tab: parse_pref(prefs.as_ref(), PrefKey::ActiveTab).unwrap_or_default(),
            last_location: prefs
                .get_or_warn(PrefKey::LastLocation)
                .filter(|s| !s.trim().is_empty()),
        };

        tracing::debug!("Presentation state loaded: {:?}", state);
        let (tx, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            state: Mutex::new(state),
            prefs,
            tx,
        }
    }

    pub fn snapshot(&self) -> PresentationState {
        self.state.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresentationState> {
        self.tx.subscribe()
    }

    pub fn set_unit(&self, unit: UnitSystem) {
        self.mutate(|s| s.unit = unit, PrefKey::Unit, unit.as_pref_str());
    }

    pub fn set_theme(&self, theme: Theme) {
        self.mutate(|s| s.theme = theme, PrefKey::Theme, theme.as_str());
    }

    pub fn toggle_theme(&self) -> Theme {
        let theme = self.state.lock().theme.toggled();
        self.set_theme(theme);
        theme
    }

    pub fn set_active_tab(&self, tab: Tab) {
        self.mutate(|s| s.active_tab = tab, PrefKey::ActiveTab, tab.as_str());
    }

    pub fn set_last_location(&self, location: &str) {
        let location = location.trim().to_string();
        self.mutate(
            |s| s.last_location = Some(location.clone()),
            PrefKey::LastLocation,
            &location,
        );
    }

    fn mutate<F>(&self, update: F, key: PrefKey, value: &str)
    where
        F: FnOnce(&mut PresentationState),
    {
        let snapshot = {
            let mut state = self.state.lock();
            update(&mut state);
            state.clone()
        };

        self.prefs.set_or_warn(key, value);
        let _ = self.tx.send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::preferences::MemoryPreferences;

    #[test]
    fn defaults_without_preferences() {
        let store = PresentationStateStore::load(Arc::new(MemoryPreferences::new()), false);
        let state = store.snapshot();
        assert_eq!(state.unit, UnitSystem::Metric);
        assert_eq!(state.theme, Theme::Light);
        assert_eq!(state.active_tab, Tab::Current);
        assert_eq!(state.last_location, None);

        let dark = PresentationStateStore::load(Arc::new(MemoryPreferences::new()), true);
        assert_eq!(dark.snapshot().theme, Theme::Dark);
    }

    #[test]
    fn unparsable_values_fall_back() {
        let prefs = MemoryPreferences::new()
            .with(PrefKey::Unit, "kelvin")
            .with(PrefKey::Theme, "dark");
        let store = PresentationStateStore::load(Arc::new(prefs), false);
        assert_eq!(store.snapshot().unit, UnitSystem::Metric);
        assert_eq!(store.snapshot().theme, Theme::Dark);
    }

    #[test]
    fn setters_persist_and_notify() {
        let prefs = Arc::new(MemoryPreferences::new());
        let store = PresentationStateStore::load(prefs.clone(), false);
        let mut rx = store.subscribe();

        store.set_unit(UnitSystem::Imperial);
        assert_eq!(prefs.get(PrefKey::Unit).unwrap().as_deref(), Some("fahrenheit"));
        assert_eq!(rx.try_recv().unwrap().unit, UnitSystem::Imperial);

        assert_eq!(store.toggle_theme(), Theme::Dark);
        assert_eq!(prefs.get(PrefKey::Theme).unwrap().as_deref(), Some("dark"));
        assert_eq!(rx.try_recv().unwrap().theme, Theme::Dark);

        store.set_active_tab(Tab::History);
        store.set_last_location(" Paris ");
        let _ = rx.try_recv();
        let last = rx.try_recv().unwrap();
        assert_eq!(last.active_tab, Tab::History);
        assert_eq!(last.last_location.as_deref(), Some("Paris"));
    }
}
