//! GitHub issues API

use super::{Error, Filters, Flag, Issue, Issues, Kind, Tracker};
use crate::http::Fetch;

use colored::*;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::iter;
use std::rc::Rc;
use std::vec;
use url::Url;

type Result<T, E = Error> = std::result::Result<T, E>;

/// Page size unless given explicitly as filter
const PER_PAGE: &str = "100";

/// Issues carrying a label of this name are flagged as feature
const FEATURE_LABEL: &str = "task";

lazy_static! {
    // <https://api.github.com/...?page=2>; rel="next"
    static ref LINK_ENTRY: Regex = Regex::new(r#"^<([^>]*)>\s*;\s*rel="([^"]*)"$"#).unwrap();
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
struct User {
    login: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
struct Label {
    name: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
struct PullRequest {
    html_url: Option<String>,
}

/// Issue as returned by the GitHub API. Only interesting fields are included.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RawIssue {
    number: u64,
    html_url: String,
    assignee: Option<User>,
    state: String,
    title: String,
    #[serde(default)]
    pull_request: Option<PullRequest>,
    #[serde(default)]
    labels: Vec<Label>,
}

/// Extracts the `rel="next"` target from a Link header.
///
/// Entries which cannot be parsed are skipped.
pub fn next_link(header: &str) -> Option<Url> {
    header
        .split(',')
        .filter_map(|entry| LINK_ENTRY.captures(entry.trim()))
        .find(|c| &c[2] == "next")
        .and_then(|c| Url::parse(&c[1]).ok())
}

#[derive(Debug, Clone)]
pub struct GitHub {
    user: String,
    repo: String,
    filters: Filters,
    base: Url,
    fetch: Rc<dyn Fetch>,
}

impl GitHub {
    pub fn new(
        user: String,
        repo: String,
        filters: Filters,
        base: Url,
        fetch: Rc<dyn Fetch>,
    ) -> Self {
        Self {
            user,
            repo,
            filters,
            base,
            fetch,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    /// First page URL
    fn issues_url(&self) -> Result<Url> {
        let mut filters = self.filters.clone();
        if !filters.contains_key("per_page") {
            filters.push("per_page", PER_PAGE);
        }
        let mut url = self
            .base
            .join(&format!("repos/{}/{}/issues", self.user, self.repo))?;
        filters.apply(&mut url);
        Ok(url)
    }

    /// Raw issues of all pages, following Link headers
    pub fn get_issues(&self) -> Result<Pages<'_>> {
        Ok(Pages {
            fetch: self.fetch.as_ref(),
            next: Some(self.issues_url()?),
            current: Vec::new().into_iter(),
        })
    }

    fn normalize(&self, iss: &RawIssue) -> Issue {
        Issue {
            source: Kind::GitHub,
            id: iss.number,
            url: iss.html_url.clone(),
            assigned: iss
                .assignee
                .as_ref()
                .map(|a| a.login.clone())
                .unwrap_or_else(|| "nobody".to_owned()),
            status: iss.state.clone(),
            title: iss.title.clone(),
            product: self.repo.clone(),
            module: self.repo.clone(),
            patch: Flag::from(
                iss.pull_request
                    .as_ref()
                    .and_then(|pr| pr.html_url.as_ref())
                    .map_or(false, |u| !u.is_empty()),
            ),
            feature: Flag::from(iss.labels.iter().any(|l| l.name == FEATURE_LABEL)),
        }
    }
}

impl Tracker for GitHub {
    fn get_all(&self) -> Issues<'_> {
        match self.get_issues() {
            Ok(pages) => Box::new(pages.map(move |res| res.map(|iss| self.normalize(&iss)))),
            Err(e) => Box::new(iter::once(Err(e))),
        }
    }
}

/// Paginated issue listing. Fetches the next page only when the current one is exhausted.
#[derive(Debug)]
pub struct Pages<'a> {
    fetch: &'a dyn Fetch,
    next: Option<Url>,
    current: vec::IntoIter<RawIssue>,
}

impl Pages<'_> {
    fn load(&mut self, url: Url) -> Result<()> {
        let page = self.fetch.get(&url)?;
        let issues: Vec<RawIssue> = serde_json::from_str(&page.body).map_err(|source| {
            Error::API {
                url: url.to_string(),
                source,
            }
        })?;
        debug!("{} issue(s) on {}", issues.len(), url.as_str().green());
        self.next = page.link.as_deref().and_then(next_link);
        self.current = issues.into_iter();
        Ok(())
    }
}

impl Iterator for Pages<'_> {
    type Item = Result<RawIssue>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(iss) = self.current.next() {
                return Some(Ok(iss));
            }
            let url = self.next.take()?;
            if let Err(e) = self.load(url) {
                return Some(Err(e));
            }
        }
    }
}
