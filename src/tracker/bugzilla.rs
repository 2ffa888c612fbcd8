//! Bugzilla REST API

use super::{Error, Filters, Flag, Issue, Issues, Kind, Tracker};
use crate::http::Fetch;

use lazy_static::lazy_static;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::iter;
use std::rc::Rc;
use url::Url;

type Result<T, E = Error> = std::result::Result<T, E>;

/// Fields we are interested in
const INCLUDE_FIELDS: &str = "id,assigned_to,status,summary,product,component,attachments,keywords";

/// Bugs with this keyword are flagged as feature
const FEATURE_KEYWORD: &str = "feature";

lazy_static! {
    static ref CLOSED_STATES: HashSet<&'static str> =
        ["RESOLVED", "VERIFIED", "CLOSED"].iter().copied().collect();
}

/// Human-readable bug page
pub fn bug_url(id: u64) -> String {
    format!("https://bugzilla.mozilla.org/show_bug.cgi?id={}", id)
}

/// True whenever the field is present, whatever its value
fn present<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    serde::de::IgnoredAny::deserialize(d).map(|_| true)
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
struct Assignee {
    name: String,
}

/// Bug as returned by the Bugzilla REST API
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RawBug {
    id: u64,
    assigned_to: Assignee,
    status: String,
    summary: String,
    product: String,
    component: String,
    #[serde(rename = "attachments", default, deserialize_with = "present")]
    has_attachments: bool,
    keywords: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct BugList {
    bugs: Vec<RawBug>,
}

#[derive(Debug, Clone)]
pub struct Bugzilla {
    filters: Filters,
    base: Url,
    fetch: Rc<dyn Fetch>,
}

impl Bugzilla {
    pub fn new(filters: Filters, base: Url, fetch: Rc<dyn Fetch>) -> Self {
        Self {
            filters,
            base,
            fetch,
        }
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    fn bugs_url(&self) -> Url {
        // include_fields stays out of the query, only the caller's filters are sent
        debug!("include_fields={} (not sent)", INCLUDE_FIELDS);
        let mut url = self.base.clone();
        self.filters.apply(&mut url);
        url
    }

    /// All matching bugs in a single request. Bugzilla's REST API does not paginate.
    pub fn get_issues(&self) -> Result<Vec<RawBug>> {
        let url = self.bugs_url();
        let page = self.fetch.get(&url)?;
        let list: BugList = serde_json::from_str(&page.body).map_err(|source| Error::API {
            url: url.to_string(),
            source,
        })?;
        debug!("{} bug(s) from {}", list.bugs.len(), url);
        Ok(list.bugs)
    }

    fn normalize(&self, bug: &RawBug) -> Issue {
        let status = if CLOSED_STATES.contains(bug.status.as_str()) {
            "closed"
        } else {
            "open"
        };
        Issue {
            source: Kind::Bugzilla,
            id: bug.id,
            url: bug_url(bug.id),
            assigned: bug.assigned_to.name.clone(),
            status: status.to_owned(),
            title: bug.summary.clone(),
            product: bug.product.clone(),
            module: bug.component.clone(),
            patch: Flag::from(bug.has_attachments),
            feature: Flag::from(bug.keywords.iter().any(|k| k == FEATURE_KEYWORD)),
        }
    }
}

impl Tracker for Bugzilla {
    fn get_all(&self) -> Issues<'_> {
        let bugs = iter::once_with(move || self.get_issues()).flat_map(|res| {
            let (bugs, err) = match res {
                Ok(bugs) => (bugs, None),
                Err(e) => (Vec::new(), Some(e)),
            };
            bugs.into_iter().map(Ok).chain(err.map(Err))
        });
        Box::new(bugs.map(move |res| res.map(|bug| self.normalize(&bug))))
    }
}

#[cfg(test)]
mod test {
    use super::super::fake::Fake;
    use super::super::{endpoints, Definition, Source};
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::{json, Value};

    const BASE: &str = "https://bugzilla.example.org/rest/bug";

    fn bug(id: u64, status: &str) -> Value {
        json!({
            "id": id,
            "assigned_to": {"name": "dev@example.org", "real_name": "Dev"},
            "status": status,
            "summary": format!("Bug {}", id),
            "product": "Firefox",
            "component": "General",
            "keywords": []
        })
    }

    fn bugzilla(def: &str, fake: Rc<Fake>) -> Bugzilla {
        let def: Definition = def.parse().unwrap();
        match Source::new(def, &endpoints(), fake).unwrap() {
            Source::Bugzilla(bz) => bz,
            other => panic!("expected Bugzilla source, got {:?}", other),
        }
    }

    fn normalize(raw: Value) -> Issue {
        let bz = bugzilla("bugzilla", Rc::new(Fake::new()));
        bz.normalize(&serde_json::from_value(raw).unwrap())
    }

    #[test]
    fn repeated_filters_in_query() {
        let url = format!("{}?status=NEW&status=ASSIGNED", BASE);
        let fake = Rc::new(Fake::new().page(&url, json!({"bugs": [bug(1, "NEW")]}), None));
        let bz = bugzilla("bugzilla:status=NEW:status=ASSIGNED", fake.clone());
        assert_eq!(bz.get_all().count(), 1);
        assert_eq!(fake.requested(), vec![url]);
    }

    #[test]
    fn include_fields_not_sent() {
        let bz = bugzilla("bugzilla:product=Firefox", Rc::new(Fake::new()));
        let url = bz.bugs_url();
        assert_eq!(url.as_str(), format!("{}?product=Firefox", BASE));
        assert!(url.query_pairs().all(|(k, _)| k != "include_fields"));
    }

    #[test]
    fn no_filters_no_query() {
        let bz = bugzilla("bugzilla", Rc::new(Fake::new()));
        assert_eq!(bz.bugs_url().as_str(), BASE);
    }

    #[test]
    fn yields_all_bugs_in_order() {
        let fake = Rc::new(Fake::new().page(
            BASE,
            json!({"bugs": [bug(3, "NEW"), bug(1, "CLOSED"), bug(2, "REOPENED")]}),
            // Link headers are ignored
            Some("<https://bugzilla.example.org/rest/bug?page=2>; rel=\"next\"".to_owned()),
        ));
        let bz = bugzilla("bugzilla", fake.clone());
        let all: Vec<Issue> = bz.get_all().map(|i| i.unwrap()).collect();
        assert_eq!(all.iter().map(|i| i.id).collect::<Vec<_>>(), vec![3, 1, 2]);
        assert_eq!(fake.requested().len(), 1);
    }

    #[test]
    fn fetches_lazily() {
        let fake = Rc::new(Fake::new().page(BASE, json!({"bugs": []}), None));
        let bz = bugzilla("bugzilla", fake.clone());
        let mut all = bz.get_all();
        assert!(fake.requested().is_empty());
        assert!(all.next().is_none());
        assert_eq!(fake.requested().len(), 1);
    }

    #[test]
    fn missing_bugs_key_is_fatal() {
        let fake = Rc::new(Fake::new().page(BASE, json!({"error": true}), None));
        let bz = bugzilla("bugzilla", fake);
        let mut all = bz.get_all();
        assert_matches!(all.next(), Some(Err(Error::API { .. })));
        assert!(all.next().is_none());
    }

    #[test]
    fn normalize_full() {
        let mut raw = bug(1234, "VERIFIED");
        raw["keywords"] = json!(["regression", "feature"]);
        raw["attachments"] = json!([{"id": 1}]);
        raw["summary"] = json!("Ümlauts in tab titles");
        assert_eq!(
            normalize(raw),
            Issue {
                source: Kind::Bugzilla,
                id: 1234,
                url: "https://bugzilla.mozilla.org/show_bug.cgi?id=1234".into(),
                assigned: "dev@example.org".into(),
                status: "closed".into(),
                title: "Ümlauts in tab titles".into(),
                product: "Firefox".into(),
                module: "General".into(),
                patch: Flag::Yes,
                feature: Flag::Yes,
            }
        );
    }

    #[test]
    fn closed_states() {
        for s in &["RESOLVED", "VERIFIED", "CLOSED"] {
            assert_eq!(normalize(bug(1, s)).status, "closed", "{}", s);
        }
        for s in &["NEW", "ASSIGNED", "REOPENED", "UNCONFIRMED", "closed", ""] {
            assert_eq!(normalize(bug(1, s)).status, "open", "{}", s);
        }
    }

    #[test]
    fn attachments_presence_only() {
        let mut raw = bug(1, "NEW");
        assert_eq!(normalize(raw.clone()).patch, Flag::No);
        raw["attachments"] = json!([]);
        assert_eq!(normalize(raw.clone()).patch, Flag::Yes);
        raw["attachments"] = json!(null);
        assert_eq!(normalize(raw).patch, Flag::Yes);
    }

    #[test]
    fn feature_keyword_exact() {
        let mut raw = bug(1, "NEW");
        raw["keywords"] = json!(["features", "enhancement"]);
        assert_eq!(normalize(raw.clone()).feature, Flag::No);
        raw["keywords"] = json!(["feature"]);
        assert_eq!(normalize(raw).feature, Flag::Yes);
    }

    #[test]
    fn normalize_is_idempotent() {
        let bz = bugzilla("bugzilla", Rc::new(Fake::new()));
        let raw: RawBug = serde_json::from_value(bug(9, "NEW")).unwrap();
        assert_eq!(bz.normalize(&raw), bz.normalize(&raw));
    }
}
