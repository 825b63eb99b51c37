use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use planet_aggregator::{
    properties, EnvProperties, MemoryProperties, MemoryStore, PlanetService, PropertiesStore,
    RefreshConfig, RefreshOptions, SubscriptionRegistry, HTTP_FETCHER_NAME,
};

#[derive(Parser, Debug)]
#[command(
    name = "planet-aggregator",
    about = "Aggregate syndication feeds into a planet"
)]
struct Cli {
    /// Feed URLs to subscribe and refresh.
    feeds: Vec<String>,

    /// Planet handle.
    #[arg(long, default_value = "planet")]
    planet: String,

    /// Group the subscriptions are placed in.
    #[arg(long, default_value = "default")]
    group: String,

    /// Refresh every subscription regardless of its interval.
    #[arg(long)]
    force: bool,

    /// Keep at most this many entries per subscription.
    #[arg(long)]
    entries_cap: Option<usize>,

    /// Max simultaneous outbound fetches.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Print the cycle summary as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut defaults =
        MemoryProperties::new().with(properties::FEED_FETCHER_KEY, HTTP_FETCHER_NAME);
    if let Some(concurrency) = cli.concurrency {
        defaults.set(properties::REFRESH_CONCURRENCY_KEY, concurrency.to_string());
    }
    if let Some(cap) = cli.entries_cap {
        defaults.set(properties::ENTRIES_CAP_KEY, cap.to_string());
    }
    let props: Arc<dyn PropertiesStore> = Arc::new(EnvProperties::new(defaults));

    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(SubscriptionRegistry::new(
        store.clone(),
        RefreshConfig::from_properties(props.as_ref()),
    ));
    let service = PlanetService::new(store, registry.clone(), props.clone())
        .context("failed to initialize planet service")?;

    let planet = registry.create_planet(cli.planet.clone(), None).await?;
    let group = registry
        .create_group(planet.id, cli.group.clone(), None)
        .await?;

    for url in &cli.feeds {
        let subscription = match registry.find_subscription_by_url(url).await? {
            Some(existing) => existing,
            None => registry.add_subscription(url.clone(), None).await?,
        };
        registry.add_to_group(group.id, subscription.id).await?;
    }

    let summary = service
        .refresh_all(&RefreshOptions { force: cli.force })
        .await?;

    if let Some(cap) = props.get_u64(properties::ENTRIES_CAP_KEY) {
        for subscription in registry.list_subscriptions().await? {
            registry.prune_entries(subscription.id, cap as usize).await?;
        }
    }

    service.flush().await.context("failed to commit the cycle")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!(
            "cycle summary: {} succeeded, {} failed, {} skipped; {} entries inserted, {} updated",
            summary.subscriptions_succeeded,
            summary.subscriptions_failed,
            summary.subscriptions_skipped,
            summary.entries_inserted,
            summary.entries_updated
        );
        for subscription in registry.list_subscriptions().await? {
            let entries = registry.get_entries(subscription.id).await?;
            match &subscription.last_fetch_error {
                Some(error) => {
                    println!("{} — {} entries (error: {})", subscription.feed_url, entries.len(), error)
                }
                None => println!("{} — {} entries", subscription.feed_url, entries.len()),
            }
        }
    }

    service.shutdown().await;
    Ok(())
}
