//! Catalog snapshot: an event, its ticket tiers and its add-on products.

use crate::error::Result;
use crate::gateway::StorefrontApi;
use crate::types::{EventId, LineItem, Money, ProductId, TierId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Who can see an event
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    /// Listed for everyone
    #[default]
    Public,
    /// Requires an access code
    Private,
}

/// Event header
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    /// Event id
    pub id: EventId,
    /// Display title
    pub title: String,
    /// Listing visibility
    #[serde(default)]
    pub visibility: Visibility,
    /// Whether the adopt-a-ticket lottery runs for this event
    #[serde(default)]
    pub lottery_enabled: bool,
}

fn default_category() -> String {
    "General".to_owned()
}

const fn one() -> u32 {
    1
}

/// A purchasable ticket class
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketTier {
    /// Tier id
    pub id: TierId,
    /// Display name
    pub name: String,
    /// Grouping label
    #[serde(default = "default_category")]
    pub category: String,
    /// Unit price
    pub price: Money,
    /// Stock left
    pub remaining_quantity: u32,
    /// Most units one order may hold
    #[serde(default = "one")]
    pub max_qty_per_order: u32,
    /// Sales open at (unbounded when absent)
    #[serde(default)]
    pub sales_start: Option<DateTime<Utc>>,
    /// Sales close at (unbounded when absent)
    #[serde(default)]
    pub sales_end: Option<DateTime<Utc>>,
    /// Admissions granted per unit bought
    #[serde(default = "one")]
    pub tickets_per_unit: u32,
}

/// An add-on product
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Product id
    pub id: ProductId,
    /// Display name
    pub name: String,
    /// Unit price
    pub price: Money,
    /// Stock left
    pub stock: u32,
    /// Owning event; `None` means purchasable with any event
    #[serde(default)]
    pub event_id: Option<EventId>,
}

impl Product {
    /// Whether the product can be bought alongside `event_id`
    #[must_use]
    pub fn sold_with(&self, event_id: EventId) -> bool {
        self.event_id.is_none_or(|owner| owner == event_id)
    }
}

/// Read-only snapshot of everything purchasable for one event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Catalog {
    /// The event
    pub event: EventDetails,
    /// Tiers in backend order
    pub tiers: Vec<TicketTier>,
    /// Products for this event plus global ones
    pub products: Vec<Product>,
}

impl Catalog {
    /// Assemble a snapshot, dropping products that belong to other events
    #[must_use]
    pub fn new(event: EventDetails, tiers: Vec<TicketTier>, products: Vec<Product>) -> Self {
        let products = products.into_iter().filter(|p| p.sold_with(event.id)).collect();
        Self {
            event,
            tiers,
            products,
        }
    }

    /// Look up a tier
    #[must_use]
    pub fn tier(&self, id: TierId) -> Option<&TicketTier> {
        self.tiers.iter().find(|t| t.id == id)
    }

    /// Look up a product
    #[must_use]
    pub fn product(&self, id: ProductId) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Unit price of a line item, if it is in the catalog
    #[must_use]
    pub fn price_of(&self, item: LineItem) -> Option<Money> {
        match item {
            LineItem::Tier(id) => self.tier(id).map(|t| t.price),
            LineItem::Product(id) => self.product(id).map(|p| p.price),
        }
    }

    /// Per-order cap of a line item: `max_qty_per_order` for tiers, `stock` for products
    ///
    /// Unknown items have a cap of zero and can never enter a cart.
    #[must_use]
    pub fn cap_of(&self, item: LineItem) -> u32 {
        match item {
            LineItem::Tier(id) => self.tier(id).map_or(0, |t| t.max_qty_per_order),
            LineItem::Product(id) => self.product(id).map_or(0, |p| p.stock),
        }
    }

    /// Tiers grouped by category, categories in order of first appearance
    #[must_use]
    pub fn categories(&self) -> Vec<(&str, Vec<&TicketTier>)> {
        let mut groups: Vec<(&str, Vec<&TicketTier>)> = Vec::new();
        for tier in &self.tiers {
            match groups.iter_mut().find(|(name, _)| *name == tier.category) {
                Some((_, tiers)) => tiers.push(tier),
                None => groups.push((tier.category.as_str(), vec![tier])),
            }
        }
        groups
    }
}

/// Loads catalog snapshots from the backend
#[derive(Clone)]
pub struct CatalogService {
    api: Arc<dyn StorefrontApi>,
}

impl CatalogService {
    /// Create a service over `api`
    #[must_use]
    pub fn new(api: Arc<dyn StorefrontApi>) -> Self {
        Self { api }
    }

    /// Fetch event, tiers and products concurrently
    ///
    /// # Errors
    ///
    /// Returns the first backend error among the three reads.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self, event_id: EventId) -> Result<Catalog> {
        let (event, tiers, products) = tokio::try_join!(
            self.api.event(event_id),
            self.api.tiers(event_id),
            self.api.products(event_id),
        )?;

        tracing::debug!(tiers = tiers.len(), products = products.len(), "Catalog loaded");
        Ok(Catalog::new(event, tiers, products))
    }
}
