// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-connection request context cache.
//!
//! One entry per in-flight request, created on the request-headers event and
//! destroyed by a terminal event (complete, cancel, cancel-all, connection
//! teardown). Body bytes are append-only in arrival order; response headers
//! are set once. The dispatcher is the single writer per key.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::protocol::{HeaderMap, RequestHeadersEvent, RequestKey};
use crate::view::{RequestView, ResponseView};

/// Accumulated state for one in-flight request.
#[derive(Debug)]
pub struct RequestContext {
    pub headers: Arc<RequestHeadersEvent>,
    pub body: Vec<u8>,
    pub response: Option<ResponseSnapshot>,
    pub created_at: Instant,
}

/// Last-seen response headers for a request.
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: Arc<HeaderMap>,
}

/// Result of resolving the context needed for a response-body event.
pub enum ResponseLookup {
    /// No context for the key
    Missing,
    /// Context exists but no response-headers event has been seen
    NoResponseHeaders,
    Ready(RequestView, ResponseView),
}

/// RequestKey -> RequestContext map for one connection.
#[derive(Debug, Default)]
pub struct RequestStore {
    map: DashMap<RequestKey, RequestContext>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the context for a request. Replaces any stale entry under the
    /// same key; uniqueness over the overlap window is the peer's contract.
    pub fn put_on_headers(&self, key: RequestKey, headers: Arc<RequestHeadersEvent>) {
        self.map.insert(
            key,
            RequestContext {
                headers,
                body: Vec::new(),
                response: None,
                created_at: Instant::now(),
            },
        );
    }

    /// Append a body chunk in arrival order. Returns `None` when no context
    /// exists for the key.
    pub fn append_body(&self, key: &RequestKey, data: &[u8]) -> Option<()> {
        let mut ctx = self.map.get_mut(key)?;
        ctx.body.extend_from_slice(data);
        Some(())
    }

    /// Record the response-headers snapshot (set once; a repeat overwrites).
    pub fn set_response_headers(
        &self,
        key: &RequestKey,
        status: u16,
        headers: Arc<HeaderMap>,
    ) -> Option<()> {
        let mut ctx = self.map.get_mut(key)?;
        ctx.response = Some(ResponseSnapshot { status, headers });
        Some(())
    }

    /// Destroy the context on a terminal event.
    pub fn remove_on_terminal(&self, key: &RequestKey) -> Option<RequestContext> {
        self.map.remove(key).map(|(_, ctx)| ctx)
    }

    /// Destroy every context; returns how many were dropped.
    pub fn clear_all(&self) -> usize {
        let count = self.map.len();
        self.map.clear();
        count
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Build the request view for a capability call. `with_body` controls
    /// whether the accumulated body is copied in.
    pub fn request_view(&self, key: &RequestKey, with_body: bool) -> Option<RequestView> {
        let ctx = self.map.get(key)?;
        let body = if with_body {
            Bytes::copy_from_slice(&ctx.body)
        } else {
            Bytes::new()
        };
        Some(RequestView::new(ctx.headers.clone(), body))
    }

    /// Build both views for a response-headers call (empty response body).
    pub fn views_for_response(&self, key: &RequestKey) -> Option<(RequestView, ResponseView)> {
        let ctx = self.map.get(key)?;
        let snapshot = ctx.response.as_ref()?;
        Some((
            RequestView::new(ctx.headers.clone(), Bytes::copy_from_slice(&ctx.body)),
            ResponseView::new(snapshot.status, snapshot.headers.clone(), Bytes::new()),
        ))
    }

    /// Build both views for a response-body call; the response view carries
    /// only the given chunk.
    pub fn views_for_response_chunk(&self, key: &RequestKey, chunk: Bytes) -> ResponseLookup {
        let Some(ctx) = self.map.get(key) else {
            return ResponseLookup::Missing;
        };
        let Some(snapshot) = ctx.response.as_ref() else {
            return ResponseLookup::NoResponseHeaders;
        };
        ResponseLookup::Ready(
            RequestView::new(ctx.headers.clone(), Bytes::copy_from_slice(&ctx.body)),
            ResponseView::new(snapshot.status, snapshot.headers.clone(), chunk),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(method: &str, uri: &str) -> Arc<RequestHeadersEvent> {
        Arc::new(RequestHeadersEvent {
            method: method.to_string(),
            uri: uri.to_string(),
            ..Default::default()
        })
    }

    fn key(id: u64) -> RequestKey {
        RequestKey::Id(id)
    }

    #[test]
    fn lifecycle_create_accumulate_remove() {
        let store = RequestStore::new();
        store.put_on_headers(key(1), headers("POST", "/upload"));
        assert!(store.contains(&key(1)));

        store.append_body(&key(1), b"foo").unwrap();
        store.append_body(&key(1), b"bar").unwrap();

        let view = store.request_view(&key(1), true).unwrap();
        assert_eq!(view.body(), b"foobar");

        let ctx = store.remove_on_terminal(&key(1)).unwrap();
        assert_eq!(ctx.body, b"foobar");
        assert!(!store.contains(&key(1)));
        assert!(store.remove_on_terminal(&key(1)).is_none());
    }

    #[test]
    fn append_without_headers_is_refused() {
        let store = RequestStore::new();
        assert!(store.append_body(&key(9), b"x").is_none());
    }

    #[test]
    fn response_chunk_before_response_headers() {
        let store = RequestStore::new();
        store.put_on_headers(key(2), headers("GET", "/"));
        match store.views_for_response_chunk(&key(2), Bytes::from_static(b"chunk")) {
            ResponseLookup::NoResponseHeaders => {}
            _ => panic!("expected NoResponseHeaders"),
        }

        store
            .set_response_headers(&key(2), 200, Arc::new(HeaderMap::new()))
            .unwrap();
        match store.views_for_response_chunk(&key(2), Bytes::from_static(b"chunk")) {
            ResponseLookup::Ready(_, resp) => {
                assert_eq!(resp.status(), 200);
                assert_eq!(resp.body(), b"chunk");
            }
            _ => panic!("expected Ready"),
        }
    }

    #[test]
    fn clear_all_reports_count() {
        let store = RequestStore::new();
        store.put_on_headers(key(1), headers("GET", "/a"));
        store.put_on_headers(key(2), headers("GET", "/b"));
        assert_eq!(store.clear_all(), 2);
        assert!(store.is_empty());
    }
}
