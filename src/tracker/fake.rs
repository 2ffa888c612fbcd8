//! Transport serving canned pages. Used in tests only.

use crate::http::{self, Fetch, Page};

use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use url::Url;

#[derive(Debug, Default)]
pub struct Fake {
    pages: HashMap<String, Page>,
    requested: RefCell<Vec<String>>,
}

impl Fake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers response `body` (plus optional Link header) for `url`
    pub fn page(mut self, url: &str, body: Value, link: Option<String>) -> Self {
        let page = Page {
            body: body.to_string(),
            link,
        };
        self.pages.insert(url.to_owned(), page);
        self
    }

    /// Registers a raw, possibly non-JSON body for `url`
    pub fn raw(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_owned(), Page::new(body, None));
        self
    }

    /// URLs fetched so far, in request order
    pub fn requested(&self) -> Vec<String> {
        self.requested.borrow().clone()
    }
}

impl Fetch for Fake {
    fn get(&self, url: &Url) -> Result<Page, http::Error> {
        self.requested.borrow_mut().push(url.to_string());
        match self.pages.get(url.as_str()) {
            Some(p) => Ok(p.clone()),
            None => panic!("unexpected request to {}", url),
        }
    }
}
