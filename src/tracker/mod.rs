mod bugzilla;
#[cfg(test)]
pub mod fake;
mod github;

use crate::http::{self, Fetch};

pub use bugzilla::Bugzilla;
pub use github::GitHub;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown source type `{0}' (expected one of: github, bugzilla)")]
    UnknownType(String),
    #[error("{kind} source takes {expected} positional argument(s), got {got}")]
    Arguments {
        kind: Kind,
        expected: usize,
        got: usize,
    },
    #[error("Cannot parse filter `{0}' (expected KEY=VALUE)")]
    MalformedFilter(String),
    #[error("Invalid API response from {url}")]
    API {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Cannot construct API URL")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Transport(#[from] http::Error),
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Column names in output order. Matches the field order of [`Issue`].
pub const COLUMNS: [&str; 10] = [
    "source", "id", "url", "assigned", "status", "title", "product", "module", "patch", "feature",
];

/// Source type tag, the first segment of a source definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    GitHub,
    Bugzilla,
}

impl Kind {
    /// Number of positional arguments the source constructor takes
    fn arity(self) -> usize {
        match self {
            Kind::GitHub => 2,
            Kind::Bugzilla => 0,
        }
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "github" => Ok(Kind::GitHub),
            "bugzilla" => Ok(Kind::Bugzilla),
            _ => Err(Error::UnknownType(s.to_owned())),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::GitHub => "github",
            Kind::Bugzilla => "bugzilla",
        })
    }
}

/// y/n column value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Flag {
    #[serde(rename = "y")]
    Yes,
    #[serde(rename = "n")]
    No,
}

impl From<bool> for Flag {
    fn from(b: bool) -> Self {
        if b {
            Flag::Yes
        } else {
            Flag::No
        }
    }
}

/// Normalized issue record. One CSV row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub source: Kind,
    pub id: u64,
    pub url: String,
    /// Assignee or "nobody"
    pub assigned: String,
    pub status: String,
    pub title: String,
    pub product: String,
    pub module: String,
    pub patch: Flag,
    pub feature: Flag,
}

/// Query filters. Each key may carry several values which are sent as repeated query parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters(BTreeMap<String, Vec<String>>);

impl Filters {
    pub fn push<K: Into<String>, V: Into<String>>(&mut self, key: K, val: V) {
        self.0.entry(key.into()).or_default().push(val.into())
    }

    /// Flattened (key, value) pairs, repeating the key once per value
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.0
            .iter()
            .flat_map(|(k, vals)| vals.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    /// Appends all filters to `url`'s query string
    pub fn apply(&self, url: &mut Url) {
        if !self.0.is_empty() {
            url.query_pairs_mut().extend_pairs(self.pairs());
        }
    }
}

impl fmt::Display for Filters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self.pairs().map(|(k, v)| format!("{}={}", k, v)).collect();
        f.write_str(&pairs.join(":"))
    }
}

impl Deref for Filters {
    type Target = BTreeMap<String, Vec<String>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<BTreeMap<String, Vec<String>>> for Filters {
    fn from(m: BTreeMap<String, Vec<String>>) -> Self {
        Self(m)
    }
}

/// Parsed source definition: `TYPE:POS1:...:KEY=VAL:...`
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub kind: Kind,
    pub args: Vec<String>,
    pub filters: Filters,
}

impl FromStr for Definition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut bits = s.split(':');
        let kind = bits.next().unwrap_or_default().parse()?;
        let mut args = Vec::new();
        let mut filters = Filters::default();
        for bit in bits {
            let mut kv = bit.split('=');
            match (kv.next(), kv.next(), kv.next()) {
                (Some(arg), None, _) => args.push(arg.to_owned()),
                (Some(key), Some(val), None) => filters.push(key, val),
                _ => return Err(Error::MalformedFilter(bit.to_owned())),
            }
        }
        Ok(Self {
            kind,
            args,
            filters,
        })
    }
}

/// API base URLs
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub github: Url,
    pub bugzilla: Url,
}

/// Issue tracker capable of producing normalized issues.
///
/// The returned iterator fetches lazily as it is consumed. Calling `get_all` again starts over
/// with fresh requests.
pub trait Tracker {
    fn get_all(&self) -> Issues<'_>;
}

pub type Issues<'a> = Box<dyn Iterator<Item = Result<Issue>> + 'a>;

/// Configured issue source, selected by the definition's type tag
#[derive(Debug, Clone)]
pub enum Source {
    GitHub(GitHub),
    Bugzilla(Bugzilla),
}

impl Source {
    pub fn new(def: Definition, endpoints: &Endpoints, fetch: Rc<dyn Fetch>) -> Result<Self> {
        let Definition {
            kind,
            args,
            filters,
        } = def;
        if args.len() != kind.arity() {
            return Err(Error::Arguments {
                kind,
                expected: kind.arity(),
                got: args.len(),
            });
        }
        let mut args = args.into_iter();
        Ok(match kind {
            Kind::GitHub => Source::GitHub(GitHub::new(
                args.next().unwrap_or_default(),
                args.next().unwrap_or_default(),
                filters,
                endpoints.github.clone(),
                fetch,
            )),
            Kind::Bugzilla => {
                Source::Bugzilla(Bugzilla::new(filters, endpoints.bugzilla.clone(), fetch))
            }
        })
    }

    /// Parses a source definition string and constructs the matching source
    pub fn parse(definition: &str, endpoints: &Endpoints, fetch: Rc<dyn Fetch>) -> Result<Self> {
        Self::new(definition.parse()?, endpoints, fetch)
    }

    pub fn kind(&self) -> Kind {
        match self {
            Source::GitHub(_) => Kind::GitHub,
            Source::Bugzilla(_) => Kind::Bugzilla,
        }
    }
}

/// Renders the source back in definition syntax
impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filters = match self {
            Source::GitHub(gh) => {
                write!(f, "{}:{}:{}", self.kind(), gh.user(), gh.repo())?;
                gh.filters()
            }
            Source::Bugzilla(bz) => {
                write!(f, "{}", self.kind())?;
                bz.filters()
            }
        };
        if !filters.is_empty() {
            write!(f, ":{}", filters)?;
        }
        Ok(())
    }
}

impl Tracker for Source {
    fn get_all(&self) -> Issues<'_> {
        match self {
            Source::GitHub(gh) => gh.get_all(),
            Source::Bugzilla(bz) => bz.get_all(),
        }
    }
}

#[cfg(test)]
pub(crate) fn endpoints() -> Endpoints {
    Endpoints {
        github: Url::parse("https://api.github.com/").unwrap(),
        bugzilla: Url::parse("https://bugzilla.example.org/rest/bug").unwrap(),
    }
}
