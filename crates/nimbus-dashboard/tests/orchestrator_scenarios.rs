#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::MockApi;
use nimbus_dashboard::{
    DashboardView, LoadError, LoadIntent, LoadStatus, NoticeLevel, OrchestratorEvent,
    OrchestratorSettings, PresentationState, Section, Tab, WeatherOrchestrator,
};
use nimbus_weather::{
    FetchError, FetchErrorKind, FixedGeolocation, GeolocationProvider, LocationKey,
    UnavailableGeolocation, UnitSystem,
};
use tokio::sync::broadcast;

fn orchestrator(api: &Arc<MockApi>, eager: bool) -> WeatherOrchestrator {
    orchestrator_with(api, Arc::new(UnavailableGeolocation), eager)
}

fn orchestrator_with(
    api: &Arc<MockApi>,
    geolocation: Arc<dyn GeolocationProvider>,
    eager: bool,
) -> WeatherOrchestrator {
    let settings = OrchestratorSettings {
        eager_fetch: eager,
        ..OrchestratorSettings::default()
    };
    WeatherOrchestrator::new(api.clone(), geolocation, settings)
}

fn drain(rx: &mut broadcast::Receiver<OrchestratorEvent>) -> Vec<OrchestratorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn session_names(events: &[OrchestratorEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            OrchestratorEvent::Snapshot(s) => s.session.as_ref().map(|s| s.location.name.clone()),
            OrchestratorEvent::Notice(_) => None,
        })
        .collect()
}

fn notices(events: &[OrchestratorEvent]) -> Vec<(NoticeLevel, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            OrchestratorEvent::Notice(n) => Some((n.level, n.message.clone())),
            OrchestratorEvent::Snapshot(_) => None,
        })
        .collect()
}

#[tokio::test]
async fn slow_first_search_is_discarded() {
    let api = Arc::new(
        MockApi::new()
            .with_city("Paris", 18.0, 60.0)
            .with_city("Berlin", 12.0, 55.0)
            .with_delay("paris", Duration::from_millis(300)),
    );
    let orch = orchestrator(&api, true);
    let mut rx = orch.subscribe();

    let (paris, berlin) = tokio::join!(orch.load_by_city("Paris"), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        orch.load_by_city("Berlin").await
    });

    assert_eq!(paris, Err(LoadError::Superseded));
    assert_eq!(berlin, Ok(LoadStatus::Loaded));
    assert_eq!(orch.session().unwrap().location.name, "Berlin");
    assert!(!session_names(&drain(&mut rx)).contains(&"Paris".to_string()));
}

#[tokio::test]
async fn fast_first_search_is_discarded_once_superseded() {
    let api = Arc::new(
        MockApi::new()
            .with_city("Paris", 18.0, 60.0)
            .with_city("Berlin", 12.0, 55.0)
            .with_delay("paris", Duration::from_millis(40))
            .with_delay("berlin", Duration::from_millis(200)),
    );
    let orch = orchestrator(&api, true);
    let mut rx = orch.subscribe();

    let (paris, berlin) = tokio::join!(orch.load_by_city("Paris"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        orch.load_by_city("Berlin").await
    });

    assert_eq!(paris, Err(LoadError::Superseded));
    assert!(berlin.is_ok());
    let events = drain(&mut rx);
    assert!(!session_names(&events).contains(&"Paris".to_string()));
    assert_eq!(session_names(&events).last().map(String::as_str), Some("Berlin"));
}

#[tokio::test]
async fn forecast_failure_leaves_a_partial_session() {
    let api = Arc::new(
        MockApi::new()
            .with_city("London", 15.0, 70.0)
            .with_forecast_error(FetchError::NotFound("City not found".into())),
    );
    let orch = orchestrator(&api, true);

    let status = orch.load_by_city("London").await.unwrap();

    assert_eq!(status, LoadStatus::PartiallyLoaded);
    let session = orch.session().unwrap();
    assert_eq!(session.current.temp_c, 15.0);
    assert!(session.forecast.is_none());
    assert_eq!(
        session.forecast_error.as_ref().map(FetchError::kind),
        Some(FetchErrorKind::NotFound)
    );
    assert!(session.history.is_some());
    assert!(orch.last_error().is_none());
}

#[tokio::test]
async fn current_weather_shows_before_slow_history() {
    let api = Arc::new(
        MockApi::new()
            .with_city("London", 15.0, 70.0)
            .with_history_delay(Duration::from_millis(800))
            .with_history_error(FetchError::Timeout),
    );
    let orch = orchestrator(&api, true);

    let (result, ()) = tokio::join!(orch.load_by_city("London"), async {
        tokio::time::sleep(Duration::from_millis(200)).await;

        let session = orch.session().expect("current weather applied while history is pending");
        assert_eq!(session.location.name, "London");
        assert!(session.forecast.is_some());
        assert!(session.history.is_none());
        assert!(session.history_error.is_none());
        assert_eq!(orch.status(), LoadStatus::PartiallyLoaded);
    });

    assert_eq!(result, Ok(LoadStatus::PartiallyLoaded));
    let session = orch.session().unwrap();
    assert_eq!(
        session.history_error.as_ref().map(FetchError::kind),
        Some(FetchErrorKind::Timeout)
    );
    assert!(session.forecast.is_some());
}

#[tokio::test]
async fn sub_resource_timeout_only_blanks_that_field() {
    for forecast_times_out in [true, false] {
        let api = MockApi::new().with_city("London", 15.0, 70.0);
        let api = Arc::new(if forecast_times_out {
            api.with_forecast_error(FetchError::Timeout)
        } else {
            api.with_history_error(FetchError::Timeout)
        });
        let orch = orchestrator(&api, true);
        let mut rx = orch.subscribe();

        assert_eq!(orch.load_by_city("London").await, Ok(LoadStatus::PartiallyLoaded));

        let session = orch.session().unwrap();
        assert_eq!(session.forecast.is_none(), forecast_times_out);
        assert_eq!(session.history.is_none(), !forecast_times_out);
        let failed = if forecast_times_out {
            &session.forecast_error
        } else {
            &session.history_error
        };
        assert_eq!(failed.as_ref().map(FetchError::kind), Some(FetchErrorKind::Timeout));
        assert!(orch.last_error().is_none());
        assert!(notices(&drain(&mut rx))
            .iter()
            .all(|(level, _)| *level != NoticeLevel::Error));
    }
}

#[tokio::test]
async fn current_weather_timeout_fails_and_keeps_previous_session() {
    let api = Arc::new(
        MockApi::new()
            .with_city("London", 15.0, 70.0)
            .with_city("Paris", 18.0, 60.0)
            .with_current_error("paris", FetchError::Timeout),
    );
    let orch = orchestrator(&api, true);
    orch.load_by_city("London").await.unwrap();

    assert_eq!(
        orch.load_by_city("Paris").await,
        Err(LoadError::Fetch(FetchError::Timeout))
    );

    assert_eq!(orch.status(), LoadStatus::Failed);
    assert_eq!(orch.session().unwrap().location.name, "London");
    let descriptor = orch.last_error().unwrap();
    assert_eq!(descriptor.kind, FetchErrorKind::Timeout);
    assert!(descriptor.retryable);
    assert_eq!(descriptor.intent, LoadIntent::City("Paris".to_string()));
    assert_eq!(
        descriptor.message,
        "Request timed out. Please check your internet connection."
    );
}

#[tokio::test]
async fn history_failure_marks_history_section_unavailable() {
    let api = Arc::new(
        MockApi::new()
            .with_city("London", 15.0, 70.0)
            .with_history_error(FetchError::Timeout),
    );
    let orch = orchestrator(&api, true);
    orch.load_by_city("London").await.unwrap();

    let view = DashboardView::build(&orch.snapshot(), &PresentationState::default());

    assert_eq!(
        view.history,
        Section::Unavailable(FetchError::Timeout.user_message().to_string())
    );
    assert_eq!(view.forecast.ready().map(Vec::len), Some(5));
    assert!(view.current.is_some());
}

#[tokio::test]
async fn concurrent_ip_loads_both_apply() {
    let api = Arc::new(
        MockApi::new()
            .with_city("Madrid", 25.0, 30.0)
            .with_ip_city("Madrid")
            .with_delay("auto:ip", Duration::from_millis(50)),
    );
    let orch = orchestrator(&api, true);

    let (first, second) = tokio::join!(orch.load_by_ip(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        orch.load_by_ip().await
    });

    assert!(first.is_ok(), "first IP load: {:?}", first);
    assert!(second.is_ok(), "second IP load: {:?}", second);
    assert_eq!(api.calls().0, 1);
    assert_eq!(orch.session().unwrap().key, LocationKey::for_city("Madrid"));
    assert_eq!(orch.status(), LoadStatus::Loaded);
}

#[tokio::test]
async fn switching_tabs_on_a_full_session_issues_no_requests() {
    let api = Arc::new(MockApi::new().with_city("London", 15.0, 70.0));
    let orch = orchestrator(&api, true);
    orch.load_by_city("London").await.unwrap();
    assert_eq!(api.calls(), (1, 1, 1));

    for tab in [Tab::Forecast, Tab::History, Tab::Forecast, Tab::Current] {
        assert_eq!(orch.switch_tab(tab).await, Ok(LoadStatus::Loaded));
    }
    assert_eq!(api.calls(), (1, 1, 1));
    assert_eq!(orch.active_tab(), Tab::Current);
}

#[tokio::test]
async fn imperial_view_of_a_london_load() {
    let api = Arc::new(MockApi::new().with_city("London", 15.0, 70.0));
    let orch = orchestrator(&api, true);
    orch.load_by_city("London").await.unwrap();

    let presentation = PresentationState {
        unit: UnitSystem::Imperial,
        ..PresentationState::default()
    };
    let view = DashboardView::build(&orch.snapshot(), &presentation);
    let current = view.current.unwrap();

    assert_eq!(current.temperature.to_string(), "59");
    assert_eq!(current.temp_unit, "°F");
    assert_eq!(current.humidity, "70%");
    assert_eq!(current.location_name, "London");
    assert_eq!(view.forecast.ready().map(Vec::len), Some(5));
}

#[tokio::test]
async fn concurrent_refreshes_share_one_request() {
    let api = Arc::new(MockApi::new().with_city("London", 15.0, 70.0));
    let orch = orchestrator(&api, true);
    orch.load_by_city("London").await.unwrap();

    let (a, b) = tokio::join!(orch.refresh(), orch.refresh());

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(api.calls(), (2, 2, 2));
}

#[tokio::test]
async fn cached_location_is_not_refetched() {
    let api = Arc::new(
        MockApi::new()
            .with_city("London", 15.0, 70.0)
            .with_city("Paris", 18.0, 60.0),
    );
    let orch = orchestrator(&api, true);

    orch.load_by_city("London").await.unwrap();
    orch.load_by_city("Paris").await.unwrap();
    orch.load_by_city("  LONDON ").await.unwrap();

    assert_eq!(api.calls(), (2, 2, 2));
    assert_eq!(orch.session().unwrap().location.name, "London");
}

#[tokio::test]
async fn location_chain_falls_back_to_default_city() {
    let api = Arc::new(MockApi::new().with_city("London", 15.0, 70.0));
    let orch = orchestrator(&api, true);
    let mut rx = orch.subscribe();

    let status = orch.use_current_location().await.unwrap();

    assert_eq!(status, LoadStatus::Loaded);
    assert_eq!(orch.session().unwrap().key, LocationKey::for_city("London"));
    let notices = notices(&drain(&mut rx));
    assert!(notices.contains(&(NoticeLevel::Info, "Using IP location...".to_string())));
    assert!(notices.iter().all(|(level, _)| *level != NoticeLevel::Error));
}

#[tokio::test]
async fn location_chain_uses_ip_when_coordinates_fail() {
    let api = Arc::new(
        MockApi::new()
            .with_city("Madrid", 25.0, 30.0)
            .with_ip_city("Madrid"),
    );
    let orch = orchestrator_with(&api, Arc::new(FixedGeolocation::new(40.4168, -3.7038)), true);

    orch.use_current_location().await.unwrap();

    let session = orch.session().unwrap();
    assert_eq!(session.key, LocationKey::for_city("Madrid"));
    assert_eq!(session.query, nimbus_weather::LocationQuery::city("Madrid"));
}

#[tokio::test]
async fn location_chain_prefers_geolocation() {
    let api = Arc::new(
        MockApi::new()
            .with_city("Oslo", 5.0, 80.0)
            .with_coordinates_city("Oslo"),
    );
    let orch = orchestrator_with(&api, Arc::new(FixedGeolocation::new(59.9139, 10.7522)), true);

    orch.use_current_location().await.unwrap();

    let session = orch.session().unwrap();
    assert_eq!(session.key.as_str(), "59.9139,10.7522");
    assert_eq!(session.location.name, "Oslo");
    assert_eq!(api.calls().0, 1);
}

#[tokio::test]
async fn failed_search_keeps_session_and_retry_reissues_it() {
    let api = Arc::new(MockApi::new().with_city("London", 15.0, 70.0));
    let orch = orchestrator(&api, true);
    let mut rx = orch.subscribe();
    orch.load_by_city("London").await.unwrap();

    let err = orch.load_by_city("Atlantis").await.unwrap_err();
    assert_eq!(err.fetch_error().map(FetchError::kind), Some(FetchErrorKind::NotFound));
    assert_eq!(orch.status(), LoadStatus::Failed);
    assert_eq!(orch.session().unwrap().location.name, "London");

    let descriptor = orch.last_error().unwrap();
    assert_eq!(descriptor.intent, LoadIntent::City("Atlantis".to_string()));
    assert_eq!(
        descriptor.message,
        "Location not found. Please check the spelling and try again."
    );
    assert!(notices(&drain(&mut rx)).contains(&(
        NoticeLevel::Error,
        "Location not found. Please check the spelling and try again.".to_string()
    )));

    api.add_city("Atlantis", 28.0, 90.0);
    assert_eq!(orch.retry().await, Ok(LoadStatus::Loaded));
    assert_eq!(orch.session().unwrap().location.name, "Atlantis");
    assert!(orch.last_error().is_none());
}

#[tokio::test]
async fn lazy_mode_fetches_tab_data_on_demand() {
    let api = Arc::new(MockApi::new().with_city("London", 15.0, 70.0));
    let orch = orchestrator(&api, false);

    assert_eq!(orch.load_by_city("London").await, Ok(LoadStatus::Loaded));
    assert_eq!(api.calls(), (1, 0, 0));

    assert_eq!(orch.switch_tab(Tab::Forecast).await, Ok(LoadStatus::Loaded));
    assert_eq!(api.calls(), (1, 1, 0));

    orch.switch_tab(Tab::Current).await.unwrap();
    orch.switch_tab(Tab::Forecast).await.unwrap();
    assert_eq!(api.calls(), (1, 1, 0));

    orch.switch_tab(Tab::History).await.unwrap();
    assert_eq!(api.calls(), (1, 1, 1));
    assert!(orch.session().unwrap().history.is_some());
}

#[tokio::test]
async fn empty_search_warns_without_requests() {
    let api = Arc::new(MockApi::new().with_city("London", 15.0, 70.0));
    let orch = orchestrator(&api, true);
    let mut rx = orch.subscribe();

    assert_eq!(orch.load_by_city("   ").await, Err(LoadError::EmptyQuery));

    assert_eq!(api.calls(), (0, 0, 0));
    assert_eq!(orch.status(), LoadStatus::Idle);
    assert_eq!(
        notices(&drain(&mut rx)),
        vec![(NoticeLevel::Warning, "Please enter a city name".to_string())]
    );
}
