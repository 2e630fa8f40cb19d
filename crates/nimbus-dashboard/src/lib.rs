//! Dashboard core for Nimbus
//!
//! Owns the current weather session, coalesces and caches backend calls,
//! tracks presentation preferences, and derives the view a renderer paints.

pub mod app;
pub mod display;
pub mod error;
pub mod orchestrator;
pub mod preferences;
pub mod presentation;
pub mod session;

pub use app::{Dashboard, ViewRenderer};
pub use display::{DashboardView, Section};
pub use error::LoadError;
pub use orchestrator::{OrchestratorEvent, OrchestratorSettings, SessionSnapshot, WeatherOrchestrator};
pub use preferences::{JsonFilePreferences, MemoryPreferences, PrefKey, PreferenceStore};
pub use presentation::{PresentationState, PresentationStateStore, Theme};
pub use session::{
    ErrorDescriptor, LoadIntent, LoadStatus, Notice, NoticeLevel, Tab, WeatherSession,
};
