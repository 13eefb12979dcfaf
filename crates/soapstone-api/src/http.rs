//! HTTP implementation of [`RequestExecutor`].

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use tracing::{debug, warn};
use url::Url;

use soapstone_entities::{ApiResponse, EntityRequest, Method, PageInfo, RequestError, RequestExecutor};

use crate::{ApiError, ClientConfig};

const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Executor that sends requests to one server over HTTP.
pub struct HttpExecutor {
    http: Client,
    base_url: Url,
    access_token: Option<String>,
}

impl HttpExecutor {
    /// Create an executor from a validated configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        config.validate()?;
        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            http,
            base_url: config.url()?,
            access_token: config.access_token.clone(),
        })
    }

    /// Get the server base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn send(&self, request: &EntityRequest) -> Result<Response, ApiError> {
        let url = request.resolve(&self.base_url)?;
        debug!(method = %request.method, url = %url, "sending request");

        let mut builder = self.http.request(http_method(request.method), url);
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn execute(&self, request: &EntityRequest) -> Result<ApiResponse, RequestError> {
        let response = self.send(request).await?;
        handle_response(request, response).await
    }

    fn is_logged_in(&self) -> bool {
        self.access_token.is_some()
    }
}

fn http_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

async fn handle_response(
    request: &EntityRequest,
    response: Response,
) -> Result<ApiResponse, RequestError> {
    let status = response.status();
    let page = page_info(response.headers());
    let text = response.text().await.map_err(ApiError::from)?;

    if !status.is_success() {
        warn!(request = %request, status = status.as_u16(), "request failed");
        return Err(RequestError::Status {
            status: status.as_u16(),
            body: (!text.is_empty()).then_some(text),
        });
    }

    let body = if text.trim().is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(&text).map_err(ApiError::from)?
    };

    Ok(ApiResponse {
        status: status.as_u16(),
        body,
        page,
    })
}

fn page_info(headers: &HeaderMap) -> PageInfo {
    let (next, prev) = headers
        .get(reqwest::header::LINK)
        .and_then(|v| v.to_str().ok())
        .map(parse_link_header)
        .unwrap_or_default();
    let total_count = headers
        .get(TOTAL_COUNT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok());
    PageInfo {
        next,
        prev,
        total_count,
    }
}

/// Extract the `rel="next"` and `rel="prev"` targets of a `Link` header.
pub fn parse_link_header(value: &str) -> (Option<String>, Option<String>) {
    let mut next = None;
    let mut prev = None;

    for link in value.split(',') {
        let Some(rest) = link.trim().strip_prefix('<') else {
            continue;
        };
        let Some((target, params)) = rest.split_once('>') else {
            continue;
        };
        for param in params.split(';') {
            let Some((name, rels)) = param.trim().split_once('=') else {
                continue;
            };
            if !name.trim().eq_ignore_ascii_case("rel") {
                continue;
            }
            for rel in rels.trim().trim_matches('"').split_whitespace() {
                if rel.eq_ignore_ascii_case("next") {
                    next.get_or_insert_with(|| target.to_string());
                } else if rel.eq_ignore_ascii_case("prev") || rel.eq_ignore_ascii_case("previous") {
                    prev.get_or_insert_with(|| target.to_string());
                }
            }
        }
    }

    (next, prev)
}
