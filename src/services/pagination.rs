//! Cursor pagination over provider list endpoints, exposed as a lazy stream.

use crate::error::Result;
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};

/// One page from a list endpoint. `next_cursor` is absent on the last page.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

/// A provider list endpoint that can be walked page by page.
#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    type Item: Send + 'static;

    /// Fetches the page addressed by `cursor`, or the first page when `None`.
    async fn fetch_page(&self, cursor: Option<String>) -> Result<Page<Self::Item>>;
}

/// Walks `source` until a page comes back without a cursor.
///
/// Pages are requested only as items are consumed. The first failing page
/// ends the stream with that error.
pub fn paginate<S: PageSource>(source: S) -> BoxStream<'static, Result<S::Item>> {
    let stream = try_stream! {
        let mut cursor: Option<String> = None;
        loop {
            let page = source.fetch_page(cursor.take()).await?;
            for item in page.items {
                yield item;
            }
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
    };
    stream.boxed()
}
