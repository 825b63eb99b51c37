mod common;

use std::sync::Arc;

use common::{
    build_service, build_service_err, default_props, entry, feed, init_tracing, Script,
    ScriptedFetcher,
};
use planet_aggregator::{
    properties, DefaultUrlStrategy, FetcherRegistry, InitializationError, MemoryProperties,
    MemoryStore, PlanetError, PlanetService, PropertiesStore, RefreshConfig, RefreshOptions,
    SubscriptionRegistry, UrlStrategy,
};

const FEED_A: &str = "https://example.com/a.xml";

#[tokio::test]
async fn construction_without_fetcher_config_fails_fast() {
    init_tracing();

    let err = build_service_err(MemoryProperties::new());
    assert!(
        matches!(
            err,
            PlanetError::Initialization(InitializationError::NotConfigured)
        ),
        "expected NotConfigured, got: {}",
        err
    );

    // A blank value is as good as no value.
    let err = build_service_err(MemoryProperties::new().with(properties::FEED_FETCHER_KEY, "  "));
    assert!(matches!(
        err,
        PlanetError::Initialization(InitializationError::NotConfigured)
    ));
}

#[tokio::test]
async fn construction_with_unknown_fetcher_fails_fast() {
    init_tracing();

    let err =
        build_service_err(MemoryProperties::new().with(properties::FEED_FETCHER_KEY, "dialup"));
    match err {
        PlanetError::Initialization(InitializationError::UnknownImplementation(name)) => {
            assert_eq!(name, "dialup")
        }
        other => panic!("expected UnknownImplementation, got: {}", other),
    }
}

#[tokio::test]
async fn broken_fetcher_constructor_fails_as_construction_error() {
    init_tracing();

    let mut fetchers = FetcherRegistry::with_defaults();
    fetchers.register("flaky", |_| {
        Err(PlanetError::Persistence("socket pool exhausted".to_string()))
    });

    let props: Arc<dyn PropertiesStore> =
        Arc::new(MemoryProperties::new().with(properties::FEED_FETCHER_KEY, "flaky"));
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(SubscriptionRegistry::new(
        store.clone(),
        RefreshConfig::from_properties(props.as_ref()),
    ));

    let err = match PlanetService::with_fetchers(store, registry, props, &fetchers) {
        Ok(_) => panic!("construction with a broken factory must fail"),
        Err(e) => e,
    };
    match err {
        PlanetError::Initialization(InitializationError::Construction { name, reason }) => {
            assert_eq!(name, "flaky");
            assert!(reason.contains("socket pool exhausted"));
        }
        other => panic!("expected Construction, got: {}", other),
    }
}

#[tokio::test]
async fn failed_construction_leaves_the_store_usable() -> planet_aggregator::Result<()> {
    init_tracing();

    // First attempt with broken configuration, second with good
    // configuration against the same kind of store.
    build_service_err(MemoryProperties::new());

    let (_store, registry, service) = build_service(default_props())?;
    registry.add_subscription(FEED_A, None).await?;
    service.flush().await?;
    Ok(())
}

#[tokio::test]
async fn release_called_twice_does_not_fault() -> planet_aggregator::Result<()> {
    init_tracing();
    let (_store, registry, service) = build_service(default_props())?;

    registry.add_subscription(FEED_A, None).await?;
    service.release().await;
    service.release().await;

    // The context is reusable after release; only shutdown is terminal.
    registry.add_subscription(FEED_A, None).await?;
    service.flush().await?;
    Ok(())
}

#[tokio::test]
async fn release_discards_uncommitted_work() -> planet_aggregator::Result<()> {
    init_tracing();
    let (_store, registry, service) = build_service(default_props())?;

    registry.add_subscription(FEED_A, None).await?;
    service.release().await;
    assert!(
        registry.find_subscription_by_url(FEED_A).await?.is_none(),
        "unflushed subscription must be discarded"
    );

    registry.add_subscription(FEED_A, None).await?;
    service.flush().await?;
    service.release().await;
    assert!(
        registry.find_subscription_by_url(FEED_A).await?.is_some(),
        "flushed subscription survives release"
    );
    Ok(())
}

#[tokio::test]
async fn flush_failure_surfaces_persistence_error() -> planet_aggregator::Result<()> {
    init_tracing();
    let (store, registry, service) = build_service(default_props())?;

    registry.add_subscription(FEED_A, None).await?;
    store.fail_next_flush().await;

    let err = service.flush().await.expect_err("flush must fail");
    assert!(
        matches!(err, PlanetError::Persistence(_)),
        "expected Persistence, got: {}",
        err
    );

    // Caller chose to discard: the batch is gone.
    service.release().await;
    assert!(registry.find_subscription_by_url(FEED_A).await?.is_none());

    // Retrying the whole batch works once the store recovers.
    registry.add_subscription(FEED_A, None).await?;
    service.flush().await?;
    Ok(())
}

#[tokio::test]
async fn shutdown_is_terminal_for_mutating_calls() -> planet_aggregator::Result<()> {
    init_tracing();
    let (_store, registry, service) = build_service(default_props())?;

    registry.add_subscription(FEED_A, None).await?;
    service.flush().await?;
    service.shutdown().await;

    let err = service
        .refresh_all(&RefreshOptions::default())
        .await
        .expect_err("refresh after shutdown must fail");
    assert!(matches!(err, PlanetError::IllegalState(_)));

    let err = service.flush().await.expect_err("flush after shutdown must fail");
    assert!(matches!(err, PlanetError::IllegalState(_)));

    let fetcher = ScriptedFetcher::new()
        .with(FEED_A, Script::Feed(feed(vec![entry("a-1", "late")])))
        .into_arc();
    let err = service
        .set_feed_fetcher(fetcher)
        .await
        .expect_err("swap after shutdown must fail");
    assert!(matches!(err, PlanetError::IllegalState(_)));

    // release stays callable, and shutdown is idempotent.
    service.release().await;
    service.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn collaborator_accessors_are_observable() -> planet_aggregator::Result<()> {
    init_tracing();
    let (_store, registry, service) = build_service(default_props())?;

    assert!(Arc::ptr_eq(&service.registry(), &registry));
    assert!(service
        .properties()
        .get(properties::FEED_FETCHER_KEY)
        .is_some());

    let strategy: Arc<dyn UrlStrategy> = Arc::new(DefaultUrlStrategy::new("https://planet.example.org"));
    service.set_url_strategy(strategy.clone()).await?;
    assert!(
        Arc::ptr_eq(&service.url_strategy().await, &strategy),
        "the active URL strategy is observable after being set"
    );

    let planet = registry.create_planet("rust", Some("Planet Rust".to_string())).await?;
    assert_eq!(
        service.url_strategy().await.planet_url(&planet),
        "https://planet.example.org/rust"
    );

    let group = registry.create_group(planet.id, "weekly", None).await?;
    assert_eq!(
        service.url_strategy().await.group_url(&planet, &group),
        "https://planet.example.org/rust/group/weekly"
    );
    Ok(())
}
