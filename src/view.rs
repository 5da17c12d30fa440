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

//! Read-only views handed to the inspection capability.
//!
//! A [`RequestView`] shares the headers snapshot held by the request
//! context, so building one per event is cheap. Query parsing is
//! deliberately minimal: percent-decoding only, `+` is NOT treated as a
//! space, repeated keys keep insertion order.

use bytes::Bytes;
use std::sync::Arc;

use crate::protocol::{header_get, header_get_all, HeaderMap, RequestHeadersEvent, RequestMetadata};

/// One in-flight request as the capability sees it.
#[derive(Debug, Clone)]
pub struct RequestView {
    headers: Arc<RequestHeadersEvent>,
    body: Bytes,
}

impl RequestView {
    pub(crate) fn new(headers: Arc<RequestHeadersEvent>, body: Bytes) -> Self {
        Self { headers, body }
    }

    pub fn method(&self) -> &str {
        &self.headers.method
    }

    pub fn uri(&self) -> &str {
        &self.headers.uri
    }

    pub fn metadata(&self) -> &RequestMetadata {
        &self.headers.metadata
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers.headers
    }

    /// First value for `name`, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers.headers, name)
    }

    /// Every value for `name`, case-insensitive.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        header_get_all(&self.headers.headers, name)
    }

    /// Accumulated request body. Empty until body chunks have arrived.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Uri up to the first `?`.
    pub fn path(&self) -> &str {
        match self.headers.uri.split_once('?') {
            Some((path, _)) => path,
            None => &self.headers.uri,
        }
    }

    /// Raw query string after the first `?`, if any.
    pub fn query(&self) -> Option<&str> {
        self.headers.uri.split_once('?').map(|(_, q)| q)
    }

    /// Percent-decoded query parameters, repeated keys grouped in
    /// insertion order.
    pub fn query_params(&self) -> Vec<(String, Vec<String>)> {
        let mut params: Vec<(String, Vec<String>)> = Vec::new();
        let Some(query) = self.query() else {
            return params;
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (percent_decode(k), percent_decode(v)),
                None => (percent_decode(pair), String::new()),
            };
            match params.iter_mut().find(|(k, _)| *k == key) {
                Some((_, values)) => values.push(value),
                None => params.push((key, vec![value])),
            }
        }
        params
    }

    /// First value of the named query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_params()
            .into_iter()
            .find(|(k, _)| k == name)
            .and_then(|(_, vs)| vs.into_iter().next())
    }

    pub fn is_json(&self) -> bool {
        content_type_contains(&self.headers.headers, &["application/json"])
    }

    pub fn is_html(&self) -> bool {
        content_type_contains(&self.headers.headers, &["text/html"])
    }

    pub fn is_form(&self) -> bool {
        content_type_contains(&self.headers.headers, &["application/x-www-form-urlencoded"])
    }

    pub fn is_multipart(&self) -> bool {
        content_type_contains(&self.headers.headers, &["multipart/"])
    }

    pub fn is_image(&self) -> bool {
        content_type_contains(&self.headers.headers, &["image/"])
    }

    pub fn is_xml(&self) -> bool {
        content_type_contains(&self.headers.headers, &["application/xml", "text/xml"])
    }

    pub fn is_javascript(&self) -> bool {
        content_type_contains(
            &self.headers.headers,
            &["application/javascript", "text/javascript"],
        )
    }

    #[cfg(test)]
    pub(crate) fn for_test(method: &str, uri: &str) -> Self {
        Self::new(
            Arc::new(RequestHeadersEvent {
                method: method.to_string(),
                uri: uri.to_string(),
                ..Default::default()
            }),
            Bytes::new(),
        )
    }
}

/// The upstream response as the capability sees it.
///
/// For `on_response` the body is empty; for `on_response_body` it holds the
/// latest chunk only.
#[derive(Debug, Clone)]
pub struct ResponseView {
    status: u16,
    headers: Arc<HeaderMap>,
    body: Bytes,
}

impl ResponseView {
    pub(crate) fn new(status: u16, headers: Arc<HeaderMap>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        header_get_all(&self.headers, name)
    }

    /// Latest response body chunk; never accumulated.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_json(&self) -> bool {
        content_type_contains(&self.headers, &["application/json"])
    }

    pub fn is_html(&self) -> bool {
        content_type_contains(&self.headers, &["text/html"])
    }

    pub fn is_form(&self) -> bool {
        content_type_contains(&self.headers, &["application/x-www-form-urlencoded"])
    }

    pub fn is_multipart(&self) -> bool {
        content_type_contains(&self.headers, &["multipart/"])
    }

    pub fn is_xml(&self) -> bool {
        content_type_contains(&self.headers, &["application/xml", "text/xml"])
    }

    pub fn is_javascript(&self) -> bool {
        content_type_contains(&self.headers, &["application/javascript", "text/javascript"])
    }

    pub fn is_image(&self) -> bool {
        content_type_contains(&self.headers, &["image/"])
    }
}

fn content_type_contains(headers: &HeaderMap, needles: &[&str]) -> bool {
    let Some(value) = header_get(headers, "content-type") else {
        return false;
    };
    let lower = value.to_ascii_lowercase();
    needles.iter().any(|needle| lower.contains(needle))
}

/// Percent-decoding without `+`-to-space translation. Malformed escapes
/// pass through verbatim.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).copied().and_then(hex_val),
                bytes.get(i + 2).copied().and_then(hex_val),
            ) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestHeadersEvent;

    fn view(uri: &str) -> RequestView {
        RequestView::for_test("GET", uri)
    }

    fn view_with_content_type(ct: &str) -> RequestView {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type".to_string(), vec![ct.to_string()]);
        RequestView::new(
            Arc::new(RequestHeadersEvent {
                method: "POST".to_string(),
                uri: "/".to_string(),
                headers,
                ..Default::default()
            }),
            Bytes::new(),
        )
    }

    #[test]
    fn path_query_split_on_first_question_mark() {
        let v = view("/search?q=a?b&x=1");
        assert_eq!(v.path(), "/search");
        assert_eq!(v.query(), Some("q=a?b&x=1"));

        let v = view("/plain");
        assert_eq!(v.path(), "/plain");
        assert_eq!(v.query(), None);
    }

    #[test]
    fn query_decoding_keeps_plus() {
        let v = view("/s?q=a%20b+c");
        assert_eq!(v.query_param("q").unwrap(), "a b+c");
    }

    #[test]
    fn repeated_keys_preserve_insertion_order() {
        let v = view("/s?tag=x&other=1&tag=y");
        let params = v.query_params();
        assert_eq!(params[0].0, "tag");
        assert_eq!(params[0].1, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(params[1].0, "other");
    }

    #[test]
    fn malformed_escape_passes_through() {
        let v = view("/s?q=%zz%4");
        assert_eq!(v.query_param("q").unwrap(), "%zz%4");
    }

    #[test]
    fn response_content_type_sniffing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Content-Type".to_string(),
            vec!["multipart/byteranges; boundary=sep".to_string()],
        );
        let resp = ResponseView::new(206, Arc::new(headers), Bytes::new());
        assert!(resp.is_multipart());
        assert!(!resp.is_form());
        assert!(!resp.is_json());

        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type".to_string(),
            vec!["application/x-www-form-urlencoded".to_string()],
        );
        let resp = ResponseView::new(200, Arc::new(headers), Bytes::new());
        assert!(resp.is_form());
    }

    #[test]
    fn content_type_sniffing() {
        assert!(view_with_content_type("application/json; charset=utf-8").is_json());
        assert!(view_with_content_type("Application/JSON").is_json());
        assert!(view_with_content_type("text/xml").is_xml());
        assert!(view_with_content_type("application/xml").is_xml());
        assert!(view_with_content_type("text/javascript").is_javascript());
        assert!(view_with_content_type("multipart/form-data; boundary=x").is_multipart());
        assert!(!view_with_content_type("text/plain").is_json());
        assert!(!view("/no-headers").is_json());
    }
}
