use ahash::AHashMap;
use fetch_mock_core::CorsPreflightData;
use parking_lot::Mutex;
use url::Url;

/// Preflight grants keyed by absolute request URL.
///
/// Entries never expire: `Access-Control-Max-Age` is deliberately ignored
/// so test outcomes never depend on wall-clock time. The cache empties
/// only on an explicit clear.
#[derive(Debug, Default)]
pub(crate) struct PreflightCache {
    entries: Mutex<AHashMap<String, CorsPreflightData>>,
}

impl PreflightCache {
    pub(crate) fn get(&self, url: &Url) -> Option<CorsPreflightData> {
        self.entries.lock().get(url.as_str()).cloned()
    }

    pub(crate) fn insert(&self, url: &Url, data: CorsPreflightData) {
        self.entries.lock().insert(url.as_str().to_string(), data);
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }
}
