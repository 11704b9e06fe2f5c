//! Page retrieval
//!
//! `Transport` is the only place network I/O happens. `PageFetcher` sits on
//! top of it and turns a URL into a parsed document or a `FetchError`; it
//! never panics and never logs, callers decide what a failure means.

use reqwest::blocking::Client;
use reqwest::tls::Version;
use scraper::Html;
use std::time::Duration;

use crate::error::FetchError;

/// Raw HTTP access: a GET for pages and a form-encoded POST for the
/// variant pricing endpoint
pub trait Transport {
    fn get(&self, url: &str) -> Result<String, FetchError>;

    fn post_form(&self, url: &str, form: &[(String, String)]) -> Result<String, FetchError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &str) -> Result<String, FetchError> {
        (**self).get(url)
    }

    fn post_form(&self, url: &str, form: &[(String, String)]) -> Result<String, FetchError> {
        (**self).post_form(url, form)
    }
}

/// Blocking reqwest transport.
///
/// The target site serves a certificate that does not validate and refuses
/// anything older than TLS 1.2, so certificate checks are off and the
/// minimum protocol version is pinned.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .user_agent(user_agent)
            .danger_accept_invalid_certs(true)
            .min_tls_version(Version::TLS_1_2);

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    fn read_body(
        url: &str,
        response: reqwest::Result<reqwest::blocking::Response>,
    ) -> Result<String, FetchError> {
        let response = response.map_err(|e| FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().map_err(|e| FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<String, FetchError> {
        Self::read_body(url, self.client.get(url).send())
    }

    fn post_form(&self, url: &str, form: &[(String, String)]) -> Result<String, FetchError> {
        Self::read_body(url, self.client.post(url).form(form).send())
    }
}

/// Fetches and parses pages
#[derive(Debug)]
pub struct PageFetcher<T> {
    transport: T,
}

impl<T: Transport> PageFetcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Retrieve `url` and parse it. A body with no markup at all counts as
    /// a failure, same as a network error.
    pub fn fetch(&self, url: &str) -> Result<Html, FetchError> {
        let body = self.transport.get(url)?;
        if body.trim().is_empty() {
            return Err(FetchError::Empty {
                url: url.to_string(),
            });
        }

        let document = Html::parse_document(&body);

        // html5ever always synthesises <html><head><body>; if nothing else
        // came out of the body there is nothing to work with
        let has_content = document
            .root_element()
            .descendants()
            .skip(1)
            .any(|node| match node.value() {
                scraper::Node::Element(el) => !matches!(el.name(), "head" | "body"),
                scraper::Node::Text(text) => !text.trim().is_empty(),
                _ => false,
            });

        if !has_content {
            return Err(FetchError::Empty {
                url: url.to_string(),
            });
        }

        Ok(document)
    }
}
