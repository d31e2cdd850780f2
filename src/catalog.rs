use crate::markup::Document;
use crate::slug::slugify;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Document-level meta marker naming the catalog endpoint.
pub const ENTITIES_URL_MARKER: &str = "entities-url";

static HTTP: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

/// One catalog record: a name plus whatever else the catalog chose to attach.
/// The extra fields are opaque and preserved verbatim through serialization so
/// the detail view can re-display them. Identity is the slugified name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    /// Serialized form carried on an injected link element.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_payload(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Slugified terms extracted from article meta markers. A set: marker order
/// is irrelevant and duplicate terms collapse.
#[derive(Debug, Clone, Default)]
pub struct TermSet {
    slugs: BTreeSet<String>,
}

impl TermSet {
    pub fn from_raw<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let slugs = terms
            .into_iter()
            .map(|term| slugify(term.as_ref()))
            .filter(|slug| !slug.is_empty())
            .collect();
        Self { slugs }
    }

    pub fn contains_slug(&self, slug: &str) -> bool {
        self.slugs.contains(slug)
    }

    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slugs.len()
    }
}

#[derive(Debug)]
pub enum CatalogError {
    Http(reqwest::Error),
    Decode(serde_json::Error),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Http(err) => write!(f, "catalog request failed: {err}"),
            CatalogError::Decode(err) => write!(f, "catalog response is not a JSON array: {err}"),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<reqwest::Error> for CatalogError {
    fn from(value: reqwest::Error) -> Self {
        CatalogError::Http(value)
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(value: serde_json::Error) -> Self {
        CatalogError::Decode(value)
    }
}

/// Fetches the entity catalog and filters it down to the requested terms.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    url: String,
}

impl CatalogClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Reads the endpoint URL from the document's `entities-url` marker.
    /// `None` when the marker is absent: configuration absence, not a fault.
    pub fn from_document(document: &Document) -> Option<Self> {
        document
            .meta_content(document.root(), ENTITIES_URL_MARKER)
            .first()
            .map(|url| Self::new(*url))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One GET, one JSON-array parse, then the subsequence of entities whose
    /// slugified name matches a requested term, in catalog order.
    pub async fn load_entities(&self, terms: &TermSet) -> Result<Vec<Entity>, CatalogError> {
        let body = HTTP
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let catalog: Vec<Entity> = serde_json::from_str(&body)?;
        let relevant: Vec<Entity> = catalog
            .into_iter()
            .filter(|entity| terms.contains_slug(&entity.slug()))
            .collect();
        debug!(
            url = %self.url,
            terms = terms.len(),
            relevant = relevant.len(),
            "catalog loaded"
        );
        Ok(relevant)
    }
}
