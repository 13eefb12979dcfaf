//! Request descriptions and the executor seam.
//!
//! Hooks never talk HTTP themselves. They describe a request as an
//! [`EntityRequest`] and hand it to a [`RequestExecutor`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{RequestError, TemplateError};

/// Base used to render a template without a server.
const RENDER_BASE: &str = "http://localhost/";

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

impl Segment {
    fn parse(raw: &str, template: &str) -> Result<Self, TemplateError> {
        match raw.strip_prefix(':') {
            Some("") => Err(TemplateError::EmptyParam(template.to_string())),
            Some(name) => Ok(Segment::Param(name.to_string())),
            None => Ok(Segment::Literal(raw.to_string())),
        }
    }
}

/// A URL path with named `:param` segments.
///
/// Parameter values are substituted whole, one per segment, and
/// percent-encoded on render. An id containing `/`, `?` or the text `:id`
/// lands in its segment verbatim instead of altering the URL structure.
///
/// ```
/// use soapstone_entities::{RequestParams, UrlTemplate};
///
/// let template = UrlTemplate::parse("/api/v1/groups/:id/join").unwrap();
/// let params = RequestParams::new().with("id", "a/b");
/// assert_eq!(template.render(&params).unwrap(), "/api/v1/groups/a%2Fb/join");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    raw: String,
    path: Vec<Segment>,
    query: Vec<(String, Segment)>,
}

impl UrlTemplate {
    /// Parse a template such as `/api/v1/statuses/:id` or
    /// `/api/v1/groups/relationships?id[]=:id`.
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let (path, query) = match raw.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (raw, None),
        };

        let path = path
            .strip_prefix('/')
            .ok_or_else(|| TemplateError::NotAbsolute(raw.to_string()))?;

        let path = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/')
                .map(|s| Segment::parse(s, raw))
                .collect::<Result<Vec<_>, _>>()?
        };

        let query = query
            .into_iter()
            .flat_map(|q| q.split('&'))
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                Ok((key.to_string(), Segment::parse(value, raw)?))
            })
            .collect::<Result<Vec<_>, TemplateError>>()?;

        Ok(Self {
            raw: raw.to_string(),
            path,
            query,
        })
    }

    /// The template as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of the parameters this template needs.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.path
            .iter()
            .chain(self.query.iter().map(|(_, seg)| seg))
            .filter_map(|seg| match seg {
                Segment::Param(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
    }

    /// Check that `params` covers every parameter of the template.
    pub fn check(&self, params: &RequestParams) -> Result<(), TemplateError> {
        for name in self.params() {
            if params.get(name).is_none() {
                return Err(self.missing(name));
            }
        }
        Ok(())
    }

    /// Resolve the template against a server base URL.
    ///
    /// Any path on `base` is kept as a prefix.
    pub fn resolve(&self, base: &Url, params: &RequestParams) -> Result<Url, TemplateError> {
        let mut url = base.clone();
        url.set_query(None);
        url.set_fragment(None);

        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| TemplateError::CannotBeABase(base.to_string()))?;
            segments.pop_if_empty();
            for segment in &self.path {
                segments.push(self.value(segment, params)?);
            }
        }

        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, segment) in &self.query {
                pairs.append_pair(key, self.value(segment, params)?);
            }
        }

        Ok(url)
    }

    /// Render the path and query without a server.
    pub fn render(&self, params: &RequestParams) -> Result<String, TemplateError> {
        let base = Url::parse(RENDER_BASE).map_err(|e| TemplateError::Url(e.to_string()))?;
        let url = self.resolve(&base, params)?;
        Ok(match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        })
    }

    fn value<'a>(
        &'a self,
        segment: &'a Segment,
        params: &'a RequestParams,
    ) -> Result<&'a str, TemplateError> {
        match segment {
            Segment::Literal(s) => Ok(s.as_str()),
            Segment::Param(name) => params.get(name).ok_or_else(|| self.missing(name)),
        }
    }

    fn missing(&self, name: &str) -> TemplateError {
        TemplateError::MissingParam {
            template: self.raw.clone(),
            name: name.to_string(),
        }
    }
}

impl FromStr for UrlTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Named values for a template's `:param` segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams(BTreeMap<String, String>);

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

/// Where a request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    /// A server-relative template.
    Template(UrlTemplate),
    /// A full URL handed out by the server, e.g. a pagination link.
    Absolute(Url),
}

/// Description of one API call.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRequest {
    pub method: Method,
    pub target: RequestTarget,
    pub params: RequestParams,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl EntityRequest {
    /// A request against a server-relative URL template.
    pub fn new(method: Method, template: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            method,
            target: RequestTarget::Template(UrlTemplate::parse(template)?),
            params: RequestParams::new(),
            query: Vec::new(),
            body: None,
        })
    }

    pub fn get(template: &str) -> Result<Self, TemplateError> {
        Self::new(Method::Get, template)
    }

    pub fn post(template: &str) -> Result<Self, TemplateError> {
        Self::new(Method::Post, template)
    }

    pub fn put(template: &str) -> Result<Self, TemplateError> {
        Self::new(Method::Put, template)
    }

    pub fn patch(template: &str) -> Result<Self, TemplateError> {
        Self::new(Method::Patch, template)
    }

    pub fn delete(template: &str) -> Result<Self, TemplateError> {
        Self::new(Method::Delete, template)
    }

    /// A `GET` of a full URL, such as a `Link: rel="next"` target.
    pub fn follow(url: &str) -> Result<Self, TemplateError> {
        let url = Url::parse(url).map_err(|e| TemplateError::Url(e.to_string()))?;
        Ok(Self {
            method: Method::Get,
            target: RequestTarget::Absolute(url),
            params: RequestParams::new(),
            query: Vec::new(),
            body: None,
        })
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Check that every template parameter has a value.
    pub fn check(&self) -> Result<(), TemplateError> {
        match &self.target {
            RequestTarget::Template(template) => template.check(&self.params),
            RequestTarget::Absolute(_) => Ok(()),
        }
    }

    /// Resolve the full URL against a server base.
    pub fn resolve(&self, base: &Url) -> Result<Url, TemplateError> {
        let mut url = match &self.target {
            RequestTarget::Template(template) => template.resolve(base, &self.params)?,
            RequestTarget::Absolute(url) => url.clone(),
        };
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }

    /// Path and query of this request, for logs and tests.
    pub fn path(&self) -> Result<String, TemplateError> {
        let base = Url::parse(RENDER_BASE).map_err(|e| TemplateError::Url(e.to_string()))?;
        let url = self.resolve(&base)?;
        Ok(match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        })
    }
}

impl fmt::Display for EntityRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            RequestTarget::Template(template) => write!(f, "{} {}", self.method, template),
            RequestTarget::Absolute(url) => write!(f, "{} {}", self.method, url),
        }
    }
}

/// Pagination metadata returned alongside a list response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// URL of the next (older) page.
    pub next: Option<String>,
    /// URL of the previous (newer) page.
    pub prev: Option<String>,
    /// Total size of the collection, when the server reports it.
    pub total_count: Option<u64>,
}

/// Parsed response of a successful request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Decoded JSON body; `Null` for an empty body.
    pub body: serde_json::Value,
    pub page: PageInfo,
}

impl ApiResponse {
    /// A `200 OK` carrying `body`.
    pub fn json(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            body,
            page: PageInfo::default(),
        }
    }

    /// A `204 No Content`.
    pub fn empty() -> Self {
        Self {
            status: 204,
            body: serde_json::Value::Null,
            page: PageInfo::default(),
        }
    }

    pub fn with_page(mut self, page: PageInfo) -> Self {
        self.page = page;
        self
    }
}

/// Performs described requests against a remote server.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Execute `request`, resolving to the parsed response or an error that
    /// carries the HTTP status when the server produced one.
    async fn execute(&self, request: &EntityRequest) -> Result<ApiResponse, RequestError>;

    /// Whether requests will be sent with user credentials.
    fn is_logged_in(&self) -> bool {
        true
    }
}
