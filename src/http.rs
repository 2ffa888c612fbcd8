//! Blocking HTTP transport used by all issue sources.

use clap::{crate_name, crate_version};
use colored::*;
use reqwest::blocking::Client;
use reqwest::header::*;
use std::fmt;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request error")]
    Request(#[from] reqwest::Error),
    #[error("Trying to construct invalid HTTP header")]
    Header(#[from] InvalidHeaderValue),
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Single response: body text plus the raw `Link` header if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub body: String,
    pub link: Option<String>,
}

impl Page {
    #[allow(unused)]
    pub fn new<S: Into<String>>(body: S, link: Option<&str>) -> Self {
        Self {
            body: body.into(),
            link: link.map(str::to_owned),
        }
    }
}

/// Anything which can GET an URL.
pub trait Fetch: fmt::Debug {
    fn get(&self, url: &Url) -> Result<Page>;
}

#[derive(Debug, Clone)]
pub struct Http {
    client: Client,
}

impl Http {
    pub fn new() -> Result<Self> {
        let mut h = HeaderMap::new();
        h.insert(ACCEPT, "application/json".parse()?);
        h.insert(
            USER_AGENT,
            format!("{}/{}", crate_name!(), crate_version!()).parse()?,
        );
        let client = Client::builder().default_headers(h).build()?;
        Ok(Self { client })
    }
}

impl Fetch for Http {
    fn get(&self, url: &Url) -> Result<Page> {
        info!("Fetching {}", url.as_str().green());
        let res = self.client.get(url.clone()).send()?.error_for_status()?;
        let link = res
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = res.text()?;
        debug!("{}: {} bytes", url, body.len());
        Ok(Page { body, link })
    }
}
