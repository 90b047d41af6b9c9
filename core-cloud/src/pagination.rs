//! Drains cursor-based listings into one ordered `Vec`.

use crate::error::{CloudError, Result};
use std::future::Future;
use tracing::debug;

/// One page of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }

    pub fn more(items: Vec<T>, cursor: impl Into<String>) -> Self {
        Self {
            items,
            next_cursor: Some(cursor.into()),
        }
    }

    /// Page from a `cursor` + `has_more` pair.
    pub fn from_has_more(items: Vec<T>, cursor: String, has_more: bool) -> Self {
        Self {
            items,
            next_cursor: has_more.then_some(cursor),
        }
    }
}

/// Fetch pages until the back end reports no more.
///
/// `fetch` gets `None` for the first page and the previous page's cursor
/// after that. A cursor that does not change between pages is an error
/// rather than an endless loop.
pub async fn drain_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = fetch(cursor.clone()).await?;
        pages += 1;
        items.extend(page.items);

        match page.next_cursor {
            None => break,
            Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                return Err(CloudError::RemoteError {
                    status: None,
                    message: format!("listing cursor did not advance after page {}", pages),
                });
            }
            Some(next) => cursor = Some(next),
        }
    }

    debug!(pages, entries = items.len(), "Listing drained");
    Ok(items)
}
