//! Pagination over the two Readwise paging styles.
//!
//! v2 list endpoints answer `{"results": [...], "next": "<url>"}` and the
//! client follows `next` verbatim. v3 endpoints (and `/export/`) answer
//! `{"results": [...], "nextPageCursor": "<token>"}` and the token goes back
//! as the `pageCursor` query parameter.
use futures::stream::{self, Stream};
use serde::Deserialize;
use std::collections::VecDeque;
use std::future::Future;
use std::iter::FusedIterator;

use crate::error::Result;

/// Continuation marker for the next page. Absence means the listing is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// Absolute URL of the next page (v2).
    Next(String),
    /// Opaque cursor passed back as `pageCursor` (v3).
    Opaque(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<PageCursor>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

#[derive(Debug, Deserialize)]
pub struct V2Page<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
}

impl<T> From<V2Page<T>> for Page<T> {
    fn from(page: V2Page<T>) -> Self {
        Page {
            items: page.results,
            next: page
                .next
                .filter(|n| !n.is_empty())
                .map(PageCursor::Next),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct V3Page<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default, rename = "nextPageCursor")]
    pub next_page_cursor: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
}

impl<T> From<V3Page<T>> for Page<T> {
    fn from(page: V3Page<T>) -> Self {
        Page {
            items: page.results,
            next: page
                .next_page_cursor
                .filter(|c| !c.is_empty())
                .map(PageCursor::Opaque),
        }
    }
}

/// Cursor bookkeeping shared by [`Pager`] and [`paginate`].
struct PageState<T> {
    cursor: Option<PageCursor>,
    buffer: VecDeque<T>,
    started: bool,
    done: bool,
}

impl<T> PageState<T> {
    fn new() -> Self {
        Self {
            cursor: None,
            buffer: VecDeque::new(),
            started: false,
            done: false,
        }
    }

    /// True when the buffer is drained and another page must be requested.
    fn wants_page(&self) -> bool {
        self.buffer.is_empty() && !self.done && !(self.started && self.cursor.is_none())
    }

    fn accept(&mut self, page: Page<T>) {
        self.started = true;
        // A server handing back the cursor it was just given would loop forever.
        let next = page.next.filter(|n| Some(n) != self.cursor.as_ref());
        self.cursor = next;
        self.buffer.extend(page.items);
        if self.cursor.is_none() {
            self.done = self.buffer.is_empty();
        }
    }

    fn fail(&mut self) {
        self.started = true;
        self.done = true;
        self.buffer.clear();
    }
}

/// Lazy blocking iterator over every item of a paged listing.
///
/// The first page is requested on the first call to `next`. A fetch error
/// is yielded once, after which the iterator is exhausted.
pub struct Pager<T, F> {
    fetch: F,
    state: PageState<T>,
}

impl<T, F> Pager<T, F>
where
    F: FnMut(Option<&PageCursor>) -> Result<Page<T>>,
{
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            state: PageState::new(),
        }
    }
}

impl<T, F> Iterator for Pager<T, F>
where
    F: FnMut(Option<&PageCursor>) -> Result<Page<T>>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.state.wants_page() {
            match (self.fetch)(self.state.cursor.as_ref()) {
                Ok(page) => self.state.accept(page),
                Err(err) => {
                    self.state.fail();
                    return Some(Err(err));
                }
            }
        }
        self.state.buffer.pop_front().map(Ok)
    }
}

impl<T, F> FusedIterator for Pager<T, F> where F: FnMut(Option<&PageCursor>) -> Result<Page<T>> {}

/// Async counterpart of [`Pager`]: the stream suspends at each page fetch.
///
/// The fetcher receives an owned copy of the cursor so its future does not
/// borrow the stream state.
pub fn paginate<T, F, Fut>(fetch: F) -> impl Stream<Item = Result<T>>
where
    F: FnMut(Option<PageCursor>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    stream::unfold(
        (fetch, PageState::new()),
        |(mut fetch, mut state)| async move {
            while state.wants_page() {
                match fetch(state.cursor.clone()).await {
                    Ok(page) => state.accept(page),
                    Err(err) => {
                        state.fail();
                        return Some((Err(err), (fetch, state)));
                    }
                }
            }
            let item = state.buffer.pop_front()?;
            Some((Ok(item), (fetch, state)))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use futures::{pin_mut, StreamExt};
    use serde_json::json;

    fn pages() -> Vec<Page<u32>> {
        vec![
            Page {
                items: vec![1, 2],
                next: Some(PageCursor::Opaque("c1".into())),
            },
            Page {
                items: vec![],
                next: Some(PageCursor::Opaque("c2".into())),
            },
            Page::last(vec![3]),
        ]
    }

    #[test]
    fn pager_is_lazy_and_walks_every_page() {
        let mut calls: Vec<Option<PageCursor>> = Vec::new();
        let mut source = pages().into_iter();
        let pager = Pager::new(|cursor: Option<&PageCursor>| {
            calls.push(cursor.cloned());
            Ok(source.next().unwrap_or_else(|| Page::last(vec![])))
        });
        let items: Vec<u32> = pager.map(|r| r.unwrap()).collect();
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(
            calls,
            vec![
                None,
                Some(PageCursor::Opaque("c1".into())),
                Some(PageCursor::Opaque("c2".into())),
            ]
        );
    }

    #[test]
    fn pager_fetches_nothing_until_polled() {
        let mut fetched = 0;
        {
            let _pager = Pager::new(|_: Option<&PageCursor>| {
                fetched += 1;
                Ok(Page::last(vec![1u32]))
            });
        }
        assert_eq!(fetched, 0);
    }

    #[test]
    fn pager_yields_error_once_then_stops() {
        let mut first = true;
        let mut pager = Pager::new(|_: Option<&PageCursor>| {
            if first {
                first = false;
                Ok(Page {
                    items: vec![1u32],
                    next: Some(PageCursor::Next("https://x/?page=2".into())),
                })
            } else {
                Err(ApiError::Validation("boom".into()))
            }
        });
        assert_eq!(pager.next().unwrap().unwrap(), 1);
        assert!(pager.next().unwrap().is_err());
        assert!(pager.next().is_none());
        assert!(pager.next().is_none());
    }

    #[test]
    fn repeated_cursor_ends_listing() {
        let mut calls = 0;
        let pager = Pager::new(|_: Option<&PageCursor>| {
            calls += 1;
            Ok(Page {
                items: vec![calls],
                next: Some(PageCursor::Opaque("same".into())),
            })
        });
        let items: Vec<u32> = pager.map(|r| r.unwrap()).collect();
        assert_eq!(items, vec![1, 2]);
    }

    #[test]
    fn envelopes_map_to_cursor_kinds() {
        let v2: V2Page<u32> = serde_json::from_value(json!({
            "count": 3, "results": [1, 2], "next": "https://readwise.io/api/v2/highlights/?page=2"
        }))
        .unwrap();
        let page: Page<u32> = v2.into();
        assert!(matches!(page.next, Some(PageCursor::Next(ref u)) if u.ends_with("page=2")));

        let v3: V3Page<u32> =
            serde_json::from_value(json!({ "results": [1], "nextPageCursor": null })).unwrap();
        let page: Page<u32> = v3.into();
        assert_eq!(page.next, None);

        let v3: V3Page<u32> =
            serde_json::from_value(json!({ "results": [], "nextPageCursor": "abc" })).unwrap();
        let page: Page<u32> = v3.into();
        assert_eq!(page.next, Some(PageCursor::Opaque("abc".into())));
    }

    #[tokio::test]
    async fn paginate_streams_all_items() {
        let mut source = pages().into_iter();
        let stream = paginate(move |_cursor| {
            let page = source.next().unwrap_or_else(|| Page::last(vec![]));
            async move { Ok(page) }
        });
        pin_mut!(stream);
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item.unwrap());
        }
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn paginate_surfaces_first_failure() {
        let stream = paginate(|_cursor| async {
            Err::<Page<u32>, _>(ApiError::Validation("down".into()))
        });
        pin_mut!(stream);
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }
}
