//! Catalog smoke check
//!
//! Loads one event's catalog from the configured backend and prints every tier
//! with its sale-window status.
//!
//! # Usage
//!
//! ```bash
//! BOXOFFICE_API_URL=http://localhost:3000/api \
//! BOXOFFICE_DEMO_EVENT=0b8e2f1c-3d4a-4b5c-8d9e-0f1a2b3c4d5e \
//! cargo run --bin boxoffice-demo
//! ```

use anyhow::Context;
use boxoffice_core::environment::{Clock, SystemClock};
use boxoffice_storefront::{
    gates::sale_status, telemetry, CatalogService, Config, EventId, LocalStorage, RestClient, StorefrontApi,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    telemetry::init(&config);

    let event_id: EventId = std::env::var("BOXOFFICE_DEMO_EVENT")
        .context("BOXOFFICE_DEMO_EVENT must name an event id")?
        .parse()
        .context("BOXOFFICE_DEMO_EVENT is not a valid event id")?;

    let storage = LocalStorage::open(&config.storage_path)?;
    let client = RestClient::from_config(&config)?.with_token(storage.token());
    let api: Arc<dyn StorefrontApi> = Arc::new(client);

    let catalog = CatalogService::new(api).load(event_id).await?;
    let now = SystemClock.now();

    println!("\n{} ({:?})", catalog.event.title, catalog.event.visibility);
    for (category, tiers) in catalog.categories() {
        println!("\n  {category}");
        for tier in tiers {
            let status = sale_status(tier, now);
            println!(
                "    {:<24} {:>10}  {:>4} left  max {:<3} {:?}",
                tier.name, tier.price, tier.remaining_quantity, tier.max_qty_per_order, status
            );
        }
    }

    if !catalog.products.is_empty() {
        println!("\n  Merchandise");
        for product in &catalog.products {
            println!("    {:<24} {:>10}  {:>4} in stock", product.name, product.price, product.stock);
        }
    }
    println!();

    Ok(())
}
