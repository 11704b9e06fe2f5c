//! In-memory transport for network-free tests

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::FetchError;
use crate::fetcher::Transport;

/// Serves canned pages and pricing responses and records every call.
/// Unknown GETs answer 404, unknown POSTs answer 500.
#[derive(Debug, Default)]
pub struct FakeTransport {
    pages: HashMap<String, String>,
    posts: Vec<(String, (String, String), String)>,
    calls: RefCell<Vec<String>>,
    last_form: RefCell<Option<Vec<(String, String)>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    /// Answer a POST to `url` whose form carries `option_name=option_value`
    pub fn post(mut self, url: &str, option_name: &str, option_value: &str, body: &str) -> Self {
        self.posts.push((
            url.to_string(),
            (option_name.to_string(), option_value.to_string()),
            body.to_string(),
        ));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn was_requested(&self, url: &str) -> bool {
        self.calls
            .borrow()
            .iter()
            .any(|call| call.split_once(' ').map(|(_, called)| called) == Some(url))
    }

    pub fn last_form(&self) -> Option<Vec<(String, String)>> {
        self.last_form.borrow().clone()
    }
}

impl Transport for FakeTransport {
    fn get(&self, url: &str) -> Result<String, FetchError> {
        self.calls.borrow_mut().push(format!("GET {url}"));
        self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }

    fn post_form(&self, url: &str, form: &[(String, String)]) -> Result<String, FetchError> {
        self.calls.borrow_mut().push(format!("POST {url}"));
        *self.last_form.borrow_mut() = Some(form.to_vec());
        self.posts
            .iter()
            .find(|(post_url, option, _)| post_url == url && form.contains(option))
            .map(|(_, _, body)| body.clone())
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 500,
            })
    }
}
