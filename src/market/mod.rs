//! Market data layer
//!
//! Phase-1 fan-out over the external providers (mortgage rates,
//! inflation, area lookup, optional property import). Every source is
//! fetched concurrently and fails independently: a dead provider is
//! replaced by its documented fallback constant, never aborting the
//! run. Successful fetches are cached under `market:` keys in the
//! shared TTL cache.

use crate::cache::TtlCache;
use crate::error::AdvisorError;
use crate::models::{Listing, MarketSnapshot, MarketSource, Profile, SourceStatus};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// National-average fallbacks used when a provider is unavailable.
pub const FALLBACK_RATE_30Y: f64 = 6.5;
pub const FALLBACK_RATE_15Y: f64 = 5.9;
pub const FALLBACK_INFLATION: f64 = 3.2;
pub const FALLBACK_MEDIAN_PRICE: f64 = 412_000.0;

const MARKET_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateQuote {
    pub rate_30yr: f64,
    pub rate_15yr: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaProfile {
    pub median_price: f64,
    pub summary: String,
}

/// External data providers behind one seam so the orchestrator can be
/// exercised with scripted feeds.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn fetch_rates(&self) -> Result<RateQuote>;
    async fn fetch_inflation(&self) -> Result<f64>;
    async fn fetch_area(&self, location: &str) -> Result<AreaProfile>;
    async fn import_listing(&self, url: &str) -> Result<Listing>;
    async fn search_properties(&self, location: &str, max_price: f64) -> Result<Vec<Listing>>;
}

/// HTTP-backed feed over the configured provider base URLs.
pub struct HttpMarketFeed {
    client: Client,
    rates_url: Option<String>,
    inflation_url: Option<String>,
    property_url: Option<String>,
}

impl HttpMarketFeed {
    pub fn new(
        rates_url: Option<String>,
        inflation_url: Option<String>,
        property_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            rates_url: rates_url.map(|u| u.trim_end_matches('/').to_string()),
            inflation_url: inflation_url.map(|u| u.trim_end_matches('/').to_string()),
            property_url: property_url.map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AdvisorError::UpstreamTimeout(format!("{}: {}", url, e))
            } else {
                AdvisorError::UpstreamFailure(format!("{}: {}", url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdvisorError::UpstreamFailure(format!(
                "{} returned {}",
                url, status
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AdvisorError::UpstreamFailure(format!("invalid JSON from {}: {}", url, e)))
    }

    fn require(url: &Option<String>, what: &str) -> Result<String> {
        url.clone()
            .ok_or_else(|| AdvisorError::UpstreamFailure(format!("{} provider not configured", what)))
    }
}

#[async_trait]
impl MarketFeed for HttpMarketFeed {
    async fn fetch_rates(&self) -> Result<RateQuote> {
        let base = Self::require(&self.rates_url, "rates")?;
        let body = self.get_json(&format!("{}/v1/rates/current", base)).await?;
        serde_json::from_value(body).map_err(|e| {
            AdvisorError::UpstreamFailure(format!("unexpected rates payload: {}", e))
        })
    }

    async fn fetch_inflation(&self) -> Result<f64> {
        let base = Self::require(&self.inflation_url, "inflation")?;
        let body = self
            .get_json(&format!("{}/v1/inflation/annual", base))
            .await?;
        body.get("annual_pct")
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                AdvisorError::UpstreamFailure("inflation payload missing annual_pct".to_string())
            })
    }

    async fn fetch_area(&self, location: &str) -> Result<AreaProfile> {
        let base = Self::require(&self.property_url, "property")?;
        let url = format!("{}/v1/areas?q={}", base, urlencode(location));
        let body = self.get_json(&url).await?;
        serde_json::from_value(body)
            .map_err(|e| AdvisorError::UpstreamFailure(format!("unexpected area payload: {}", e)))
    }

    async fn import_listing(&self, listing_url: &str) -> Result<Listing> {
        let base = Self::require(&self.property_url, "property")?;
        let url = format!("{}/v1/listings?url={}", base, urlencode(listing_url));
        let body = self.get_json(&url).await?;
        serde_json::from_value(body).map_err(|e| {
            AdvisorError::UpstreamFailure(format!("unexpected listing payload: {}", e))
        })
    }

    async fn search_properties(&self, location: &str, max_price: f64) -> Result<Vec<Listing>> {
        let base = Self::require(&self.property_url, "property")?;
        let url = format!(
            "{}/v1/listings/search?q={}&max_price={}",
            base,
            urlencode(location),
            max_price
        );
        let body = self.get_json(&url).await?;
        serde_json::from_value(body).map_err(|e| {
            AdvisorError::UpstreamFailure(format!("unexpected search payload: {}", e))
        })
    }
}

/// Minimal percent-encoding for query values.
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Snapshot made entirely of documented fallback values.
pub fn fallback_snapshot() -> MarketSnapshot {
    MarketSnapshot {
        rate_30yr: FALLBACK_RATE_30Y,
        rate_15yr: FALLBACK_RATE_15Y,
        inflation_rate: FALLBACK_INFLATION,
        national_median_price: FALLBACK_MEDIAN_PRICE,
        area_median_price: FALLBACK_MEDIAN_PRICE,
        area_info: "No live area data available; using national averages.".to_string(),
        imported_listing: None,
        sources: vec![
            SourceStatus {
                source: MarketSource::Rates,
                live: false,
            },
            SourceStatus {
                source: MarketSource::Inflation,
                live: false,
            },
            SourceStatus {
                source: MarketSource::Area,
                live: false,
            },
        ],
    }
}

async fn cached_fetch<T, F>(
    cache: &TtlCache<Value>,
    key: &str,
    fetch: F,
) -> Result<T>
where
    T: Serialize + for<'de> Deserialize<'de>,
    F: std::future::Future<Output = Result<T>>,
{
    if let Some(hit) = cache.get(key).await {
        if let Ok(value) = serde_json::from_value(hit) {
            debug!(key, "market cache hit");
            return Ok(value);
        }
    }

    let fresh = fetch.await?;
    if let Ok(encoded) = serde_json::to_value(&fresh) {
        cache.set(key, encoded, MARKET_CACHE_TTL).await;
    }
    Ok(fresh)
}

/// Build the phase-1 snapshot: all sources fetched concurrently, each
/// falling back independently on failure.
pub async fn build_snapshot(
    feed: &dyn MarketFeed,
    profile: &Profile,
    cache: &TtlCache<Value>,
) -> MarketSnapshot {
    let location = profile.location.clone();

    let rates_fut = cached_fetch(cache, "market:rates", feed.fetch_rates());
    let inflation_fut = cached_fetch(cache, "market:inflation", feed.fetch_inflation());
    let area_key = format!("market:area:{}", location.to_lowercase());
    let area_fut = cached_fetch(cache, &area_key, feed.fetch_area(&location));

    let import_url = profile
        .listing_url
        .as_deref()
        .filter(|_| profile.listing.is_none());
    let listing_fut = async {
        match import_url {
            Some(url) => Some(feed.import_listing(url).await),
            None => None,
        }
    };

    let (rates, inflation, area, listing) =
        tokio::join!(rates_fut, inflation_fut, area_fut, listing_fut);

    let mut sources = Vec::with_capacity(4);

    let (rate_30yr, rate_15yr) = match rates {
        Ok(quote) => {
            sources.push(SourceStatus {
                source: MarketSource::Rates,
                live: true,
            });
            (quote.rate_30yr, quote.rate_15yr)
        }
        Err(error) => {
            warn!(%error, "rates source failed, using national fallback");
            sources.push(SourceStatus {
                source: MarketSource::Rates,
                live: false,
            });
            (FALLBACK_RATE_30Y, FALLBACK_RATE_15Y)
        }
    };

    let inflation_rate = match inflation {
        Ok(rate) => {
            sources.push(SourceStatus {
                source: MarketSource::Inflation,
                live: true,
            });
            rate
        }
        Err(error) => {
            warn!(%error, "inflation source failed, using fallback");
            sources.push(SourceStatus {
                source: MarketSource::Inflation,
                live: false,
            });
            FALLBACK_INFLATION
        }
    };

    let (area_median_price, area_info) = match area {
        Ok(area) => {
            sources.push(SourceStatus {
                source: MarketSource::Area,
                live: true,
            });
            (area.median_price, area.summary)
        }
        Err(error) => {
            warn!(%error, "area source failed, using fallback");
            sources.push(SourceStatus {
                source: MarketSource::Area,
                live: false,
            });
            (
                FALLBACK_MEDIAN_PRICE,
                "No live area data available; using national averages.".to_string(),
            )
        }
    };

    let imported_listing = match listing {
        Some(Ok(listing)) => {
            sources.push(SourceStatus {
                source: MarketSource::Listing,
                live: true,
            });
            Some(listing)
        }
        Some(Err(error)) => {
            warn!(%error, "listing import failed, continuing without it");
            sources.push(SourceStatus {
                source: MarketSource::Listing,
                live: false,
            });
            None
        }
        None => None,
    };

    MarketSnapshot {
        rate_30yr,
        rate_15yr,
        inflation_rate,
        national_median_price: FALLBACK_MEDIAN_PRICE,
        area_median_price,
        area_info,
        imported_listing,
        sources,
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Feed whose every source errors, for fallback-path tests.
    pub struct FailingFeed;

    #[async_trait]
    impl MarketFeed for FailingFeed {
        async fn fetch_rates(&self) -> Result<RateQuote> {
            Err(AdvisorError::UpstreamFailure("rates down".to_string()))
        }
        async fn fetch_inflation(&self) -> Result<f64> {
            Err(AdvisorError::UpstreamTimeout("inflation slow".to_string()))
        }
        async fn fetch_area(&self, _location: &str) -> Result<AreaProfile> {
            Err(AdvisorError::UpstreamFailure("area down".to_string()))
        }
        async fn import_listing(&self, _url: &str) -> Result<Listing> {
            Err(AdvisorError::UpstreamFailure("import down".to_string()))
        }
        async fn search_properties(&self, _location: &str, _max_price: f64) -> Result<Vec<Listing>> {
            Err(AdvisorError::UpstreamFailure("search down".to_string()))
        }
    }

    /// Healthy feed with fixed values and a fetch counter.
    pub struct HealthyFeed {
        pub rate_calls: AtomicUsize,
    }

    impl HealthyFeed {
        pub fn new() -> Self {
            Self {
                rate_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MarketFeed for HealthyFeed {
        async fn fetch_rates(&self) -> Result<RateQuote> {
            self.rate_calls.fetch_add(1, Ordering::SeqCst);
            Ok(RateQuote {
                rate_30yr: 6.1,
                rate_15yr: 5.4,
            })
        }
        async fn fetch_inflation(&self) -> Result<f64> {
            Ok(2.9)
        }
        async fn fetch_area(&self, location: &str) -> Result<AreaProfile> {
            Ok(AreaProfile {
                median_price: 455_000.0,
                summary: format!("{} is a steady market.", location),
            })
        }
        async fn import_listing(&self, _url: &str) -> Result<Listing> {
            Ok(Listing {
                price: 430_000.0,
                annual_taxes: 7_200.0,
                monthly_hoa: 50.0,
                address: Some("12 Elm St".to_string()),
            })
        }
        async fn search_properties(&self, _location: &str, max_price: f64) -> Result<Vec<Listing>> {
            Ok(vec![Listing {
                price: max_price.min(395_000.0),
                annual_taxes: 6_800.0,
                monthly_hoa: 0.0,
                address: Some("44 Oak Ave".to_string()),
            }])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FailingFeed, HealthyFeed};
    use super::*;
    use std::sync::atomic::Ordering;

    fn profile() -> Profile {
        Profile {
            annual_income: 120_000.0,
            monthly_debts: 500.0,
            down_payment: 60_000.0,
            credit_score: 740,
            location: "Austin, TX".to_string(),
            monthly_rent: None,
            va_eligible: false,
            listing: None,
            listing_url: None,
            investment: None,
        }
    }

    #[tokio::test]
    async fn test_every_source_failing_yields_full_fallback() {
        let cache = TtlCache::new();
        let snapshot = build_snapshot(&FailingFeed, &profile(), &cache).await;

        assert_eq!(snapshot.rate_30yr, FALLBACK_RATE_30Y);
        assert_eq!(snapshot.rate_15yr, FALLBACK_RATE_15Y);
        assert_eq!(snapshot.inflation_rate, FALLBACK_INFLATION);
        assert_eq!(snapshot.area_median_price, FALLBACK_MEDIAN_PRICE);
        assert!(snapshot.sources.iter().all(|s| !s.live));
    }

    #[tokio::test]
    async fn test_healthy_feed_populates_live_values() {
        let cache = TtlCache::new();
        let snapshot = build_snapshot(&HealthyFeed::new(), &profile(), &cache).await;

        assert_eq!(snapshot.rate_30yr, 6.1);
        assert_eq!(snapshot.area_median_price, 455_000.0);
        assert!(snapshot.sources.iter().all(|s| s.live));
    }

    #[tokio::test]
    async fn test_rates_fetch_is_cached_across_requests() {
        let cache = TtlCache::new();
        let feed = HealthyFeed::new();

        build_snapshot(&feed, &profile(), &cache).await;
        build_snapshot(&feed, &profile(), &cache).await;

        assert_eq!(feed.rate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listing_import_runs_only_with_url() {
        let cache = TtlCache::new();
        let mut with_url = profile();
        with_url.listing_url = Some("https://example.com/listing/1".to_string());

        let snapshot = build_snapshot(&HealthyFeed::new(), &with_url, &cache).await;
        assert!(snapshot.imported_listing.is_some());
        assert!(snapshot
            .sources
            .iter()
            .any(|s| s.source == MarketSource::Listing && s.live));

        let snapshot = build_snapshot(&HealthyFeed::new(), &profile(), &cache).await;
        assert!(snapshot.imported_listing.is_none());
        assert!(!snapshot
            .sources
            .iter()
            .any(|s| s.source == MarketSource::Listing));
    }

    #[test]
    fn test_urlencode_escapes_spaces() {
        assert_eq!(urlencode("Austin, TX"), "Austin%2C%20TX");
    }
}
