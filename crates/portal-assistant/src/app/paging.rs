//! Fan-out pagination over portal search endpoints.

use std::future::Future;

use futures::future::join_all;
use tracing::warn;

use crate::infra::portal::{PortalError, SearchPage};

/// Returns how many page requests a listing of `total` matches issues.
///
/// The count is `round(total / page_size) + 1`, rounding halves up. It always
/// covers `total` and issues exactly one request when nothing matches.
pub(crate) fn page_request_count(total: u32, page_size: u32) -> u32 {
    let total = u64::from(total);
    let page_size = u64::from(page_size.max(1));
    let rounded_pages = (2 * total + page_size) / (2 * page_size);

    u32::try_from(rounded_pages + 1).unwrap_or(u32::MAX)
}

/// Collects every page of a search.
///
/// One probe request with `num = 0` reports `total`; all page requests are
/// then issued concurrently. A failed page is logged and contributes no
/// results, so sibling pages are unaffected. Results keep page order.
///
/// # Errors
/// Returns the probe request error; page errors are absorbed.
pub(crate) async fn query_all<T, FetchPage, PageFuture>(
    first_start: u32,
    page_size: u32,
    fetch_page: FetchPage,
) -> Result<Vec<T>, PortalError>
where
    FetchPage: Fn(u32, u32) -> PageFuture,
    PageFuture: Future<Output = Result<SearchPage<T>, PortalError>>,
{
    let page_size = page_size.max(1);
    let total = fetch_page(first_start, 0).await?.total;
    let page_count = page_request_count(total, page_size);

    let page_requests = (0..page_count).map(|page_index| {
        let start = first_start.saturating_add(page_index.saturating_mul(page_size));
        let page = fetch_page(start, page_size);

        async move {
            match page.await {
                Ok(page) => page.results,
                Err(error) => {
                    warn!(start, %error, "Search page failed, continuing without it");

                    Vec::new()
                }
            }
        }
    });

    Ok(join_all(page_requests).await.into_iter().flatten().collect())
}
