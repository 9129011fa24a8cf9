#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use taxcollector::config::PipelineConfig;
use taxcollector::crawler::{PageFetcher, ScrapingService};
use taxcollector::error::FetchError;
use taxcollector::identity::IdentityProvider;
use taxcollector::proxy::Proxy;
use taxcollector::random::SharedRng;
use taxcollector::storage::MemoryStorage;

pub const BASE: &str = "https://tax.example.org/clientdb/Property.aspx?cid=56";

pub fn property_url(id: &str) -> String {
    format!("{BASE}&prop_id={id}")
}

/// A detail page shaped like the county site: header table, two land rows
/// plus a blank one, two improvements, roll history and jurisdictions.
pub const DETAIL_PAGE: &str = r#"
<html>
<body>
<div id="propertyDetails">
  <table>
    <tbody>
      <tr><th colspan="4">Property</th></tr>
      <tr>
        <td>Property ID:</td><td>2163</td>
        <td>Legal Description:</td><td class="propertyDetailsLegalDescription"> LOT 4 BLK 2 OAK HILLS </td>
      </tr>
      <tr><td>Geographic ID:</td><td> R-0012-4410 </td><td>Zoning:</td><td>SF1</td></tr>
      <tr><td>Type:</td><td>Real</td><td></td><td></td></tr>
      <tr><td>Property Use Code:</td><td></td><td></td><td></td></tr>
      <tr><td>Property Use Description:</td><td></td><td></td><td></td></tr>
      <tr><th colspan="4">Location</th></tr>
      <tr><td>Address:</td><td>
          412 ELM ST
      </td><td></td><td></td></tr>
      <tr><td>Neighborhood:</td><td>OAK HILLS</td><td>Mapsco:</td><td>45-C</td></tr>
      <tr><td>Neighborhood CD:</td><td>OH01</td><td></td><td></td></tr>
      <tr><th colspan="4">Owner</th></tr>
      <tr><td>Name:</td><td>DOE JANE</td><td>Owner ID:</td><td>99812</td></tr>
      <tr><td>Mailing Address:</td><td>PO BOX 12</td><td>% Ownership:</td><td>12.5%</td></tr>
      <tr><td></td><td></td><td>Exemptions:</td><td>HS</td></tr>
    </tbody>
  </table>
</div>

<div id="improvementBuildingDetails">
  <table class="improvements">
    <tr>
      <th>Improvement #1:</th><td>Residential</td>
      <th>State Code:</th><td>A1</td>
      <th>Living Area:</th><td>1,850 sqft</td>
      <th>Value:</th><td>$123,456</td>
    </tr>
  </table>
  <table class="improvementDetails">
    <tr><th></th><th>Type</th><th>Description</th><th>Class CD</th><th>Exterior Wall</th><th>Year Built</th><th>SQFT</th></tr>
    <tr><td></td><td>MA</td><td>MAIN AREA</td><td>R4</td><td>BRICK</td><td>1998</td><td>1,850 sqft</td></tr>
    <tr><td></td><td>GAR</td><td></td><td></td><td></td><td></td><td></td></tr>
    <tr><td></td><td>OP</td><td>OPEN PORCH</td><td>R4</td><td></td><td>1998</td><td>120 sqft</td></tr>
  </table>
  <table class="improvements">
    <tr>
      <th>Improvement #2:</th><td>Outbuilding</td>
      <th>State Code:</th><td>A1</td>
      <th>Living Area:</th><td>0 sqft</td>
      <th>Value:</th><td>$4,200</td>
    </tr>
  </table>
  <table class="improvementDetails">
    <tr><th></th><th>Type</th><th>Description</th><th>Class CD</th><th>Exterior Wall</th><th>Year Built</th><th>SQFT</th></tr>
    <tr><td></td><td>STG</td><td>STORAGE</td><td>S1</td><td>METAL</td><td>2005</td><td>200 sqft</td></tr>
  </table>
</div>

<div id="landDetails">
  <table>
    <tr><th>#</th><th>Type</th><th>Description</th><th>Acres</th><th>Sqft</th><th>Eff Front</th><th>Eff Depth</th><th>Market Value</th></tr>
    <tr><td>1</td><td>F1</td><td>Residential</td><td>0.1700</td><td>7,405.20</td><td>0.00</td><td>0.00</td><td>$45,000</td></tr>
    <tr><td></td><td>F1</td><td>Residential</td><td>0.0100</td><td>435.60</td><td>0.00</td><td>0.00</td><td>$1,000</td></tr>
    <tr><td>2</td><td>F2</td><td>Easement</td><td>0.0500</td><td>2,178.00</td><td>0.00</td><td>0.00</td><td>$3,500</td></tr>
  </table>
</div>

<div id="rollHistoryDetails">
  <table>
    <tr><th>Year</th><th>Improvements</th><th>Land Market</th><th>Ag Valuation</th><th>Appraised</th><th>HS Cap</th><th>Assessed</th></tr>
    <tr><td>2021</td><td>$127,656</td><td>$48,500</td><td>0</td><td>$176,156</td><td>$0</td><td>$176,156</td></tr>
    <tr><td>2020</td><td>$120,100</td><td>$45,000</td><td>0</td><td>$165,100</td><td>$2,300</td><td>$162,800</td></tr>
  </table>
</div>

<div id="taxingJurisdictionDetails">
  <table class="tableData">
    <tr><th>Entity</th><th>Description</th><th>Tax Rate</th><th>Appraised Value</th><th>Taxable Value</th><th>Estimated Tax</th></tr>
    <tr><td>CAD</td><td>APPRAISAL DISTRICT</td><td>0.000000</td><td>$176,156</td><td>$176,156</td><td>$0.00</td></tr>
    <tr><td>GCO</td><td>COUNTY</td><td>0.428000</td><td>$176,156</td><td>$176,156</td><td>$753.95</td></tr>
    <tr><td></td><td>Total Tax Rate:</td><td>0.428000</td><td></td><td></td><td></td></tr>
  </table>
</div>
</body>
</html>
"#;

/// Serves `DETAIL_PAGE` for every URL, failing warm-up for the listed
/// proxies and the detail request for the listed URLs.
#[derive(Default)]
pub struct FakeFetcher {
    pub bad_proxies: HashSet<String>,
    pub failing_urls: HashSet<String>,
    pub used_proxies: Mutex<Vec<String>>,
    pub identities: Mutex<Vec<String>>,
    pub started: Mutex<Vec<Instant>>,
    pub calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn with_bad_proxies<I: IntoIterator<Item = &'static str>>(proxies: I) -> Self {
        Self {
            bad_proxies: proxies.into_iter().map(str::to_string).collect(),
            ..Default::default()
        }
    }

    pub fn with_failing_urls<I: IntoIterator<Item = String>>(urls: I) -> Self {
        Self {
            failing_urls: urls.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, proxy: &Proxy, identity: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.lock().push(Instant::now());
        self.used_proxies.lock().push(proxy.address.clone());
        self.identities.lock().push(identity.to_string());

        if self.bad_proxies.contains(&proxy.address) {
            return Err(FetchError::ProxyFailure {
                proxy: proxy.address.clone(),
                reason: "connection refused".into(),
            });
        }
        if self.failing_urls.contains(url) {
            return Err(FetchError::FetchFailure {
                url: url.to_string(),
                reason: "detail request returned 503 Service Unavailable".into(),
            });
        }
        Ok(DETAIL_PAGE.as_bytes().to_vec())
    }
}

pub fn pipeline_config(workers: usize) -> PipelineConfig {
    PipelineConfig {
        workers,
        pacing: Duration::ZERO,
        backoff_min_ms: 1,
        backoff_max_ms: 3,
    }
}

pub fn identities(pool: &[&str], rng: &Arc<SharedRng>) -> Arc<IdentityProvider> {
    Arc::new(IdentityProvider::new(
        pool.iter().map(|s| s.to_string()).collect(),
        Arc::clone(rng),
    ))
}

pub fn service(
    workers: usize,
    storage: &Arc<MemoryStorage>,
    fetcher: &Arc<FakeFetcher>,
) -> ScrapingService {
    service_with(pipeline_config(workers), storage, fetcher)
}

pub fn service_with(
    cfg: PipelineConfig,
    storage: &Arc<MemoryStorage>,
    fetcher: &Arc<FakeFetcher>,
) -> ScrapingService {
    let rng = Arc::new(SharedRng::seeded(11));
    ScrapingService::new(
        cfg,
        storage.clone(),
        identities(&["Mozilla/5.0 A", "Mozilla/5.0 B"], &rng),
        fetcher.clone(),
        storage.clone(),
        rng,
    )
}
