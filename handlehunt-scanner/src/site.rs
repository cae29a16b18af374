use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use url::Url;

/// Placeholder the catalog uses for the username inside `uri_check`.
pub const ACCOUNT_PLACEHOLDER: &str = "{account}";

/// One entry of the site catalog.
///
/// Field names on the wire follow the WhatsMyName dataset (`uri_check`,
/// `cat`, `valid`). Everything else in an entry is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteDefinition {
    pub name: String,
    #[serde(rename = "uri_check")]
    pub uri_template: String,
    #[serde(rename = "cat", default)]
    pub category: String,
    #[serde(rename = "valid", default, skip_serializing_if = "Option::is_none")]
    pub validity: Option<bool>,
}

impl SiteDefinition {
    pub fn new(name: impl Into<String>, uri_template: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri_template: uri_template.into(),
            category: category.into(),
            validity: None,
        }
    }

    pub fn with_validity(mut self, valid: bool) -> Self {
        self.validity = Some(valid);
        self
    }

    /// A site is probed unless the catalog explicitly marks it invalid.
    pub fn is_enabled(&self) -> bool {
        self.validity != Some(false)
    }

    /// Substitute `handle` into the template. No URI validation happens here.
    pub fn render(&self, handle: &str) -> String {
        self.uri_template.replace(ACCOUNT_PLACEHOLDER, handle)
    }

    /// Substitute `handle` and parse the result as a URL.
    pub fn probe_url(&self, handle: &str) -> Result<Url> {
        let rendered = self.render(handle);
        Url::parse(&rendered)
            .map_err(|e| ScanError::InvalidSite(format!("{}: '{}' is not a valid URL: {}", self.name, rendered, e)))
    }

    /// Checks the minimal fields the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ScanError::InvalidSite(format!(
                "entry with template '{}' has no name",
                self.uri_template
            )));
        }
        if !self.uri_template.contains(ACCOUNT_PLACEHOLDER) {
            return Err(ScanError::InvalidSite(format!(
                "{}: template '{}' has no {} placeholder",
                self.name, self.uri_template, ACCOUNT_PLACEHOLDER
            )));
        }
        self.probe_url("handlehunt").map(|_| ())
    }
}
