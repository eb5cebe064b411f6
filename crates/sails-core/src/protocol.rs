//! Request and response shapes for Sails' socket request emulation.
//!
//! A call on the client becomes a [`RequestDescriptor`], which is cleaned and
//! turned into the [`SailsRequest`] envelope that goes over the socket. The
//! backend answers with a [`SailsResponse`] through the socket.io ack.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::clean::{is_empty_value, strip_empty};

/// Header name → value.
pub type HeaderMap = BTreeMap<String, String>;

/// Query parameter name → value.
pub type Params = Map<String, Value>;

/// HTTP verbs understood by the Sails socket router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl RequestMethod {
    pub const ALL: [RequestMethod; 7] = [
        RequestMethod::Get,
        RequestMethod::Post,
        RequestMethod::Put,
        RequestMethod::Patch,
        RequestMethod::Delete,
        RequestMethod::Head,
        RequestMethod::Options,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
            RequestMethod::Put => "PUT",
            RequestMethod::Patch => "PATCH",
            RequestMethod::Delete => "DELETE",
            RequestMethod::Head => "HEAD",
            RequestMethod::Options => "OPTIONS",
        }
    }

    /// The socket.io event a request with this verb is emitted on.
    ///
    /// Sails listens on the lowercase verb and uses the same string as the
    /// envelope's `method` field.
    pub fn event_name(self) -> &'static str {
        match self {
            RequestMethod::Get => "get",
            RequestMethod::Post => "post",
            RequestMethod::Put => "put",
            RequestMethod::Patch => "patch",
            RequestMethod::Delete => "delete",
            RequestMethod::Head => "head",
            RequestMethod::Options => "options",
        }
    }

    /// Whether a request body is sent with this verb (POST, PUT, PATCH).
    pub fn accepts_body(self) -> bool {
        matches!(
            self,
            RequestMethod::Post | RequestMethod::Put | RequestMethod::Patch
        )
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call settings.
///
/// `search` is the older name for `params`. When both are set, `params` is
/// used and `search` is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<Params>,
    #[serde(default, skip_serializing_if = "HeaderMap::is_empty")]
    pub headers: HeaderMap,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Add one request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The effective query parameters: `params`, falling back to `search`.
    pub fn query(&self) -> Option<&Params> {
        self.params.as_ref().or(self.search.as_ref())
    }
}

/// One outgoing request, before it is put on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: RequestMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    #[serde(skip_serializing_if = "HeaderMap::is_empty")]
    pub headers: HeaderMap,
}

impl RequestDescriptor {
    /// Build a descriptor for one call.
    ///
    /// `default_headers` come from the client configuration; per-call headers
    /// in `options` replace them on key collision. A body passed with a verb
    /// that does not carry one is discarded.
    pub fn new(
        url: impl Into<String>,
        method: RequestMethod,
        body: Option<Value>,
        options: &RequestOptions,
        default_headers: &HeaderMap,
    ) -> Self {
        let mut headers = default_headers.clone();
        headers.extend(
            options
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );

        Self {
            url: url.into(),
            method,
            body: body.filter(|_| method.accepts_body()),
            params: options.query().cloned(),
            headers,
        }
    }

    /// Remove empty fields so the backend sees absent keys instead of nulls.
    ///
    /// An object body and `params` are swept one level deep; either is
    /// dropped once nothing is left.
    pub fn clean(mut self) -> Self {
        self.body = self
            .body
            .map(|body| match body {
                Value::Object(map) => Value::Object(strip_empty(map)),
                other => other,
            })
            .filter(|body| !is_empty_value(body));
        self.params = self
            .params
            .map(strip_empty)
            .filter(|params| !params.is_empty());
        self.headers.retain(|_, value| !value.is_empty());
        self
    }

    /// Convert into the envelope Sails expects on the socket.
    ///
    /// Body verbs send the body as `data` and move any params into the url's
    /// query string. The other verbs send the params as `data`, which is how
    /// Sails' own SDK issues GETs.
    pub fn into_envelope(self) -> SailsRequest {
        let method = self.method;
        let (url, data) = if method.accepts_body() {
            let url = match &self.params {
                Some(params) => append_query(&self.url, params),
                None => self.url,
            };
            (url, self.body)
        } else {
            (self.url, self.params.map(Value::Object))
        };

        SailsRequest {
            method: method.event_name().to_string(),
            url,
            headers: self.headers,
            data,
        }
    }
}

fn append_query(url: &str, params: &Params) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        query.append_pair(key, &query_text(value));
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{}", query.finish())
}

/// A query value as it appears in a URL: strings verbatim, anything else
/// as its JSON text.
pub(crate) fn query_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        other => Cow::Owned(other.to_string()),
    }
}

/// The request envelope emitted to Sails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SailsRequest {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "HeaderMap::is_empty")]
    pub headers: HeaderMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl SailsRequest {
    /// The envelope as the JSON object emitted on the socket. Empty headers
    /// and a missing `data` are left out.
    pub fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("method".to_string(), Value::from(self.method.as_str()));
        payload.insert("url".to_string(), Value::from(self.url.as_str()));
        if !self.headers.is_empty() {
            let headers = self
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), Value::from(value.as_str())))
                .collect();
            payload.insert("headers".to_string(), Value::Object(headers));
        }
        if let Some(data) = &self.data {
            payload.insert("data".to_string(), data.clone());
        }
        Value::Object(payload)
    }
}

/// The response envelope Sails passes back through the ack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SailsResponse {
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default)]
    pub status_code: u16,
}

impl SailsResponse {
    /// 2xx and 3xx.
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status_code)
    }

    /// Deserialize the body into a caller type.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn method_names() {
        assert_eq!(RequestMethod::Delete.as_str(), "DELETE");
        assert_eq!(RequestMethod::Delete.event_name(), "delete");
        assert_eq!(RequestMethod::Options.to_string(), "OPTIONS");
        assert_eq!(
            serde_json::to_value(RequestMethod::Patch).unwrap(),
            json!("PATCH")
        );
    }

    #[test]
    fn only_body_verbs_keep_a_body() {
        for method in RequestMethod::ALL {
            let desc = RequestDescriptor::new(
                "/x",
                method,
                Some(json!({ "a": 1 })),
                &RequestOptions::new(),
                &HeaderMap::new(),
            );
            assert_eq!(desc.body.is_some(), method.accepts_body(), "{method}");
        }
    }

    #[test]
    fn headers_merge_with_per_call_precedence() {
        let defaults = headers(&[("A", "1")]);

        let desc = RequestDescriptor::new(
            "/x",
            RequestMethod::Get,
            None,
            &RequestOptions::new().header("B", "2"),
            &defaults,
        );
        assert_eq!(desc.headers, headers(&[("A", "1"), ("B", "2")]));

        let desc = RequestDescriptor::new(
            "/x",
            RequestMethod::Get,
            None,
            &RequestOptions::new().header("A", "override"),
            &defaults,
        );
        assert_eq!(desc.headers, headers(&[("A", "override")]));
    }

    #[test]
    fn params_win_over_search() {
        let mut search = Map::new();
        search.insert("from".into(), json!("search"));
        let options = RequestOptions {
            search: Some(search.clone()),
            ..RequestOptions::new().param("from", "params")
        };
        let desc =
            RequestDescriptor::new("/x", RequestMethod::Get, None, &options, &HeaderMap::new());
        assert_eq!(desc.params.unwrap()["from"], json!("params"));

        let options = RequestOptions {
            search: Some(search),
            ..RequestOptions::new()
        };
        let desc =
            RequestDescriptor::new("/x", RequestMethod::Get, None, &options, &HeaderMap::new());
        assert_eq!(desc.params.unwrap()["from"], json!("search"));
    }

    #[test]
    fn clean_drops_empty_fields() {
        let desc = RequestDescriptor {
            url: "/x".into(),
            method: RequestMethod::Get,
            body: None,
            params: Some(Map::new()),
            headers: HeaderMap::new(),
        }
        .clean();

        assert_eq!(
            serde_json::to_value(&desc).unwrap(),
            json!({ "url": "/x", "method": "GET" })
        );
    }

    #[test]
    fn clean_sweeps_body_params_and_headers() {
        let desc = RequestDescriptor {
            url: "/x".into(),
            method: RequestMethod::Post,
            body: Some(json!({ "a": null, "b": "", "c": {}, "d": 1, "e": { "f": null, "g": 2 } })),
            params: Some(
                RequestOptions::new()
                    .param("a", Value::Null)
                    .param("b", "")
                    .params
                    .unwrap(),
            ),
            headers: headers(&[("X-Empty", ""), ("X-Kept", "v")]),
        }
        .clean();

        assert_eq!(desc.body, Some(json!({ "d": 1, "e": { "g": 2 } })));
        assert_eq!(desc.params, None);
        assert_eq!(desc.headers, headers(&[("X-Kept", "v")]));
    }

    #[test]
    fn body_that_sweeps_to_nothing_is_dropped() {
        let desc = RequestDescriptor::new(
            "/x",
            RequestMethod::Patch,
            Some(json!({ "name": null, "tags": {} })),
            &RequestOptions::new(),
            &HeaderMap::new(),
        )
        .clean();
        assert_eq!(desc.body, None);

        let desc = RequestDescriptor::new(
            "/x",
            RequestMethod::Post,
            Some(json!([null, ""])),
            &RequestOptions::new(),
            &HeaderMap::new(),
        )
        .clean();
        assert_eq!(desc.body, Some(json!([null, ""])));
    }

    #[test]
    fn get_envelope_carries_params_as_data() {
        let env = RequestDescriptor::new(
            "/user",
            RequestMethod::Get,
            None,
            &RequestOptions::new().param("limit", 10),
            &HeaderMap::new(),
        )
        .clean()
        .into_envelope();

        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({ "method": "get", "url": "/user", "data": { "limit": 10 } })
        );
    }

    #[test]
    fn post_envelope_moves_params_into_url() {
        let env = RequestDescriptor::new(
            "/user",
            RequestMethod::Post,
            Some(json!({ "name": "ada" })),
            &RequestOptions::new().param("q", "a b").param("n", 2),
            &headers(&[("Authorization", "Bearer t")]),
        )
        .clean()
        .into_envelope();

        assert_eq!(env.method, "post");
        assert_eq!(env.url, "/user?n=2&q=a+b");
        assert_eq!(env.data, Some(json!({ "name": "ada" })));
        assert_eq!(env.headers["Authorization"], "Bearer t");
        assert_eq!(
            env.to_payload(),
            json!({
                "method": "post",
                "url": "/user?n=2&q=a+b",
                "headers": { "Authorization": "Bearer t" },
                "data": { "name": "ada" },
            })
        );
        assert_eq!(env.to_payload(), serde_json::to_value(&env).unwrap());
    }

    #[test]
    fn payload_leaves_out_empty_headers_and_data() {
        let env = RequestDescriptor::new(
            "/ping",
            RequestMethod::Head,
            None,
            &RequestOptions::new(),
            &HeaderMap::new(),
        )
        .clean()
        .into_envelope();

        assert_eq!(env.to_payload(), json!({ "method": "head", "url": "/ping" }));
    }

    #[test]
    fn response_status_and_body() {
        let res: SailsResponse = serde_json::from_value(json!({
            "body": { "id": 7 },
            "headers": { "x": "y" },
            "statusCode": 201,
        }))
        .unwrap();
        assert!(res.is_success());

        #[derive(Deserialize)]
        struct Created {
            id: u32,
        }
        assert_eq!(res.json::<Created>().unwrap().id, 7);

        let res: SailsResponse = serde_json::from_value(json!({ "statusCode": 404 })).unwrap();
        assert!(!res.is_success());
        assert_eq!(res.body, Value::Null);
    }
}
