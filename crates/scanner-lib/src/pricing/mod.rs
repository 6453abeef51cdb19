//! Hourly price resolution for compute instances
//!
//! Prices are resolved through one of two strategies selected by the
//! instance lifecycle:
//! - on-demand instances query the pricing catalog
//! - spot instances average recent spot price history
//!
//! Every resolution, including unresolved ones, is memoized in a
//! run-scoped concurrent map keyed by [`PriceKey`].

mod regions;

pub use regions::{location_name, region_from_zone};

use crate::models::{Field, ResourceDescriptor};
use crate::observability::ScannerMetrics;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Trailing window of spot price history averaged for spot instances
const SPOT_HISTORY_HOURS: i64 = 24;

/// Pricing class of a compute instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Lifecycle {
    OnDemand,
    Spot,
}

impl Lifecycle {
    pub fn from_descriptor(descriptor: &ResourceDescriptor) -> Self {
        match descriptor.str_attr("InstanceLifecycle") {
            Some(l) if l.eq_ignore_ascii_case("spot") => Lifecycle::Spot,
            _ => Lifecycle::OnDemand,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::OnDemand => "on-demand",
            Lifecycle::Spot => "spot",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operating system as far as pricing is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingSystem {
    Linux,
    Windows,
    Rhel,
    Suse,
}

impl OperatingSystem {
    /// Infer from `PlatformDetails`, falling back to `Platform`
    pub fn from_descriptor(descriptor: &ResourceDescriptor) -> Self {
        let details = descriptor
            .str_attr("PlatformDetails")
            .unwrap_or_default()
            .to_ascii_lowercase();

        if details.contains("windows") {
            OperatingSystem::Windows
        } else if details.contains("red hat") {
            OperatingSystem::Rhel
        } else if details.contains("suse") {
            OperatingSystem::Suse
        } else if descriptor
            .str_attr("Platform")
            .map(|p| p.eq_ignore_ascii_case("windows"))
            .unwrap_or(false)
        {
            OperatingSystem::Windows
        } else {
            OperatingSystem::Linux
        }
    }

    /// Name used by the pricing catalog `operatingSystem` filter
    pub fn catalog_name(&self) -> &'static str {
        match self {
            OperatingSystem::Linux => "Linux",
            OperatingSystem::Windows => "Windows",
            OperatingSystem::Rhel => "RHEL",
            OperatingSystem::Suse => "SUSE",
        }
    }

    /// Product description used by spot price history
    pub fn spot_product_description(&self) -> &'static str {
        match self {
            OperatingSystem::Linux => "Linux/UNIX",
            OperatingSystem::Windows => "Windows",
            OperatingSystem::Rhel => "Red Hat Enterprise Linux",
            OperatingSystem::Suse => "SUSE Linux",
        }
    }
}

/// Structural identity of a price lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PriceKey {
    pub instance_type: String,
    pub region: String,
    pub operating_system: OperatingSystem,
    pub lifecycle: Lifecycle,
    /// Whether the instance carries a product code (bundled license)
    pub licensed: bool,
}

impl PriceKey {
    /// Derive the key; `None` when the type or placement is missing
    pub fn from_descriptor(descriptor: &ResourceDescriptor) -> Option<Self> {
        let instance_type = descriptor.str_attr("InstanceType")?;
        let region = descriptor
            .str_attr("Placement.AvailabilityZone")
            .and_then(region_from_zone)?;

        Some(Self {
            instance_type: instance_type.to_string(),
            region,
            operating_system: OperatingSystem::from_descriptor(descriptor),
            lifecycle: Lifecycle::from_descriptor(descriptor),
            licensed: descriptor.has_items("ProductCodes"),
        })
    }
}

/// Result of a price lookup
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum HourlyPrice {
    /// Hourly cost in USD
    Resolved(f64),
    /// No price could be determined; never conflated with a free resource
    Unresolved,
}

impl HourlyPrice {
    pub fn usd(&self) -> Option<f64> {
        match self {
            HourlyPrice::Resolved(v) => Some(*v),
            HourlyPrice::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, HourlyPrice::Resolved(_))
    }

    pub fn to_field(self, places: u32) -> Field {
        Field::usd(self.usd(), places)
    }
}

/// Filter for an on-demand catalog query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogFilter {
    pub instance_type: String,
    pub location: String,
    pub operating_system: &'static str,
    pub tenancy: &'static str,
}

/// One price term returned by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTerm {
    pub hourly_usd: f64,
    /// Term only applies to capacity reservations
    #[serde(default)]
    pub reservation_only: bool,
    /// Term bundles a software license
    #[serde(default)]
    pub includes_license: bool,
}

/// On-demand pricing catalog
#[async_trait]
pub trait PricingCatalog: Send + Sync {
    async fn on_demand_terms(&self, filter: &CatalogFilter) -> Result<Vec<PriceTerm>>;
}

/// Spot price history query
#[derive(Debug, Clone, PartialEq)]
pub struct SpotQuery {
    pub instance_type: String,
    pub product_description: &'static str,
    pub region: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Recent spot price samples
#[async_trait]
pub trait SpotPriceHistory: Send + Sync {
    async fn spot_prices(&self, query: &SpotQuery) -> Result<Vec<f64>>;
}

/// Pick the hourly price from a set of catalog terms
///
/// Reservation-only terms are skipped and only terms whose license inclusion
/// matches the instance are considered. The first positive price wins.
pub fn select_on_demand_price(terms: &[PriceTerm], licensed: bool) -> Option<f64> {
    terms
        .iter()
        .filter(|t| !t.reservation_only)
        .filter(|t| t.includes_license == licensed)
        .map(|t| t.hourly_usd)
        .find(|price| *price > 0.0)
}

/// Snapshot of cache effectiveness
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Memoizing, lifecycle-tiered price resolver
///
/// Two tasks missing on the same key at once may both query the backend and
/// both write the cache; the writes carry the same value so no stronger
/// locking is used.
pub struct PriceResolver {
    catalog: Arc<dyn PricingCatalog>,
    spot: Arc<dyn SpotPriceHistory>,
    cache: DashMap<PriceKey, HourlyPrice>,
    hits: AtomicU64,
    misses: AtomicU64,
    metrics: ScannerMetrics,
}

impl PriceResolver {
    pub fn new(
        catalog: Arc<dyn PricingCatalog>,
        spot: Arc<dyn SpotPriceHistory>,
        metrics: ScannerMetrics,
    ) -> Self {
        Self {
            catalog,
            spot,
            cache: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            metrics,
        }
    }

    /// Resolve the hourly price of an instance descriptor
    pub async fn resolve(&self, descriptor: &ResourceDescriptor) -> HourlyPrice {
        match PriceKey::from_descriptor(descriptor) {
            Some(key) => self.resolve_key(&key).await,
            None => {
                debug!(
                    resource_id = %descriptor.id(),
                    "Instance type or placement missing, price unresolved"
                );
                HourlyPrice::Unresolved
            }
        }
    }

    /// Resolve a price key, consulting the cache first
    pub async fn resolve_key(&self, key: &PriceKey) -> HourlyPrice {
        if let Some(price) = self.cache.get(key).map(|entry| *entry.value()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.metrics.inc_price_cache_hit();
            return price;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.metrics.inc_price_cache_miss();

        let price = match key.lifecycle {
            Lifecycle::OnDemand => self.resolve_on_demand(key).await,
            Lifecycle::Spot => self.resolve_spot(key).await,
        };

        if !price.is_resolved() {
            warn!(
                event = "price_unresolved",
                instance_type = %key.instance_type,
                region = %key.region,
                lifecycle = %key.lifecycle,
                "Hourly price could not be resolved"
            );
        }

        self.cache.insert(key.clone(), price);
        price
    }

    async fn resolve_on_demand(&self, key: &PriceKey) -> HourlyPrice {
        let Some(location) = location_name(&key.region) else {
            debug!(region = %key.region, "Region has no catalog location");
            return HourlyPrice::Unresolved;
        };

        let filter = CatalogFilter {
            instance_type: key.instance_type.clone(),
            location: location.to_string(),
            operating_system: key.operating_system.catalog_name(),
            tenancy: "Shared",
        };

        match self.catalog.on_demand_terms(&filter).await {
            Ok(terms) => select_on_demand_price(&terms, key.licensed)
                .map(HourlyPrice::Resolved)
                .unwrap_or(HourlyPrice::Unresolved),
            Err(e) => {
                warn!(
                    instance_type = %key.instance_type,
                    region = %key.region,
                    error = %e,
                    "Pricing catalog query failed"
                );
                HourlyPrice::Unresolved
            }
        }
    }

    async fn resolve_spot(&self, key: &PriceKey) -> HourlyPrice {
        let end = Utc::now();
        let query = SpotQuery {
            instance_type: key.instance_type.clone(),
            product_description: key.operating_system.spot_product_description(),
            region: key.region.clone(),
            start: end - Duration::hours(SPOT_HISTORY_HOURS),
            end,
        };

        match self.spot.spot_prices(&query).await {
            Ok(prices) if !prices.is_empty() => {
                HourlyPrice::Resolved(prices.iter().sum::<f64>() / prices.len() as f64)
            }
            Ok(_) => HourlyPrice::Unresolved,
            Err(e) => {
                warn!(
                    instance_type = %key.instance_type,
                    region = %key.region,
                    error = %e,
                    "Spot price history query failed"
                );
                HourlyPrice::Unresolved
            }
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.len(),
        }
    }
}
