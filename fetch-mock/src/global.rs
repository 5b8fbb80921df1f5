use std::sync::Arc;

use parking_lot::RwLock;

use fetch_mock_core::MockResponse;

use crate::error::FetchError;
use crate::mocker::FetchMocker;
use crate::request::{FetchInput, RequestInit};

/// The process-global fetch binding, as a stack so nested
/// install/uninstall pairs restore their predecessor.
static GLOBAL: RwLock<Vec<Arc<FetchMocker>>> = RwLock::new(Vec::new());

/// Swaps the global fetch for this mocker until [`uninstall`].
pub fn install(mocker: Arc<FetchMocker>) {
    GLOBAL.write().push(mocker);
}

/// Restores the previously-installed global fetch, if any.
pub fn uninstall() {
    GLOBAL.write().pop();
}

/// The currently-installed global mocker.
pub fn current() -> Option<Arc<FetchMocker>> {
    GLOBAL.read().last().cloned()
}

/// Fetches through the installed global mocker.
pub async fn fetch(input: impl Into<FetchInput>) -> Result<MockResponse, FetchError> {
    fetch_with(input, RequestInit::default()).await
}

pub async fn fetch_with(
    input: impl Into<FetchInput>,
    init: RequestInit,
) -> Result<MockResponse, FetchError> {
    let mocker = current().ok_or(FetchError::GlobalNotInstalled)?;
    mocker.fetch_with(input, init).await
}
