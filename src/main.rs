use std::sync::Arc;

use anyhow::Result;
use nimbus_core::Config;
use nimbus_dashboard::{
    Dashboard, DashboardView, JsonFilePreferences, Notice, NoticeLevel, PreferenceStore, Section,
    ViewRenderer,
};
use nimbus_weather::{GeolocationProvider, UnavailableGeolocation, WeatherApi, WeatherClient};

/// Renderer that writes frames to the log.
struct LogRenderer;

impl ViewRenderer for LogRenderer {
    fn render(&self, view: &DashboardView) {
        match &view.current {
            Some(current) => tracing::info!(
                "[{:?}] {}: {}{} {} ({} tab)",
                view.status,
                current.location_name,
                current.temperature,
                current.temp_unit,
                current.condition,
                view.active_tab.as_str()
            ),
            None => tracing::info!("[{:?}] no weather loaded", view.status),
        }
    }

    fn notify(&self, notice: &Notice) {
        match notice.level {
            NoticeLevel::Error => tracing::error!("{}", notice.message),
            NoticeLevel::Warning => tracing::warn!("{}", notice.message),
            NoticeLevel::Info | NoticeLevel::Success => tracing::info!("{}", notice.message),
        }
    }

    fn prompt_location_permission(&self) {
        tracing::info!("Location permission not set; showing weather for the default city");
    }
}

fn print_summary(view: &DashboardView) {
    let Some(current) = &view.current else {
        match &view.error {
            Some(error) => println!("No weather available: {}", error.message),
            None => println!("No weather available"),
        }
        return;
    };

    println!("{} ({})", current.location_name, current.location_details);
    println!(
        "  {}{}  {}  feels like {}{}",
        current.temperature,
        current.temp_unit,
        current.condition,
        current.feels_like,
        current.temp_unit
    );
    println!(
        "  humidity {}  wind {} {}  UV {}",
        current.humidity, current.wind, current.wind_direction, current.uv_index
    );
    println!("  {}", current.comfort.description);

    match &view.forecast {
        Section::Ready(cards) => {
            for card in cards {
                println!(
                    "  {:<10} {:>4} / {:<4} {}",
                    card.day_name, card.high, card.low, card.condition
                );
            }
        }
        Section::Unavailable(message) => println!("  Forecast unavailable: {}", message),
        Section::Pending => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    nimbus_core::init()?;

    let (config, _) = Config::load_validated()?;

    let client = WeatherClient::with_timeout(&config.api.base_url, config.request_timeout());
    tracing::info!("Nimbus starting against {}", client.base_url());

    let api: Arc<dyn WeatherApi> = Arc::new(client);
    let geolocation: Arc<dyn GeolocationProvider> = Arc::new(UnavailableGeolocation);
    let prefs: Arc<dyn PreferenceStore> =
        Arc::new(JsonFilePreferences::open(config.preferences_path()));
    let renderer: Arc<dyn ViewRenderer> = Arc::new(LogRenderer);

    // A city argument acts like a search; otherwise follow the stored choice.
    let dashboard = match std::env::args().nth(1) {
        Some(city) => {
            let dashboard = Dashboard::new(&config, api, geolocation, prefs, renderer);
            if let Err(e) = dashboard.search(&city).await {
                tracing::warn!("Search for {:?} failed: {}", city, e);
            }
            dashboard
        }
        None => Dashboard::initialize(&config, api, geolocation, prefs, renderer).await,
    };

    print_summary(&dashboard.view());
    Ok(())
}
