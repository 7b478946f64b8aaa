//! Site contexts and the page-section plan each one is built from.

use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use super::error::DomainError;

const MAX_CONTEXT_LEN: usize = 64;

/// Identifier of one logical website, e.g. `am` or `dgv`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SiteContext(String);

impl SiteContext {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("site context must not be empty"));
        }
        if trimmed.len() > MAX_CONTEXT_LEN {
            return Err(DomainError::validation(format!(
                "site context `{trimmed}` exceeds {MAX_CONTEXT_LEN} characters"
            )));
        }
        if !trimmed
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
        {
            return Err(DomainError::validation(format!(
                "site context `{trimmed}` may only contain lowercase letters, digits, `-` and `_`"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SiteContext {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SiteContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A page resolved by its slug and published under one or more literal paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlugPage {
    pub slug: String,
    pub paths: Vec<String>,
}

/// Detail pages for every item of a set of content types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSection {
    pub name: String,
    pub content_types: Vec<String>,
    pub prefix: String,
    #[serde(default)]
    pub suffixes: Vec<String>,
}

/// Sub-content reached through a relation field on parent items.
///
/// Paths are `{locale}/{parent_prefix}/{parent slug}/{child_segment}/{child slug}[/{suffix}]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedSection {
    pub name: String,
    pub parent_content_types: Vec<String>,
    pub relation: String,
    pub parent_prefix: String,
    #[serde(default)]
    pub child_segment: String,
    #[serde(default)]
    pub suffix: Option<String>,
}

/// Which sections make up a site's sitemap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionPlan {
    pub main_pages: Vec<SlugPage>,
    pub landing_pages: Vec<String>,
    pub collections: Vec<CollectionSection>,
    pub nested: Vec<NestedSection>,
}

const VISION_TYPES: [&str; 2] = ["58d8d7ffcc4e35a38f275ef1", "58eb5396152216149a7fc15e"];
const PROJECT_TYPES: [&str; 1] = ["58d8ec8298490acd83bf3348"];
const PARTICIPATION_TYPES: [&str; 1] = ["58da6a1707bc1351f2dfbb45"];
const ABOUT_TYPES: [&str; 1] = ["591d46ad1ff864234b8e4501"];
const DETAIL_SUFFIXES: [&str; 4] = ["over", "tijdlijn", "doe-mee", "documenten"];

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

impl Default for SectionPlan {
    fn default() -> Self {
        let page = |slug: &str, paths: &[&str]| SlugPage {
            slug: slug.to_string(),
            paths: strings(paths),
        };

        Self {
            main_pages: vec![
                page("home", &["", "home"]),
                page("visions-overview", &["toekomstvisies"]),
                page("participation-overview", &["doe-mee"]),
                page("contact", &["over-ons"]),
            ],
            landing_pages: strings(&["projecten", "in-de-buurt"]),
            collections: vec![
                CollectionSection {
                    name: "visions".to_string(),
                    content_types: strings(&VISION_TYPES),
                    prefix: "projecten".to_string(),
                    suffixes: strings(&DETAIL_SUFFIXES),
                },
                CollectionSection {
                    name: "projects".to_string(),
                    content_types: strings(&PROJECT_TYPES),
                    prefix: "toekomstvisies".to_string(),
                    suffixes: strings(&DETAIL_SUFFIXES),
                },
                CollectionSection {
                    name: "participation".to_string(),
                    content_types: strings(&PARTICIPATION_TYPES),
                    prefix: "doe-mee".to_string(),
                    suffixes: Vec::new(),
                },
                CollectionSection {
                    name: "about".to_string(),
                    content_types: strings(&ABOUT_TYPES),
                    prefix: "over-ons".to_string(),
                    suffixes: Vec::new(),
                },
            ],
            nested: vec![NestedSection {
                name: "vision-participations".to_string(),
                parent_content_types: strings(&VISION_TYPES),
                relation: "participations".to_string(),
                parent_prefix: "projecten".to_string(),
                child_segment: "doe-mee".to_string(),
                suffix: None,
            }],
        }
    }
}

/// Everything needed to build one site's sitemap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteProfile {
    pub context: SiteContext,
    /// Absolute base URL without a trailing slash.
    pub base_url: String,
    pub locales: Vec<String>,
    /// Membership flag content must carry to be listed; `None` lists everything.
    pub membership: Option<String>,
    /// Cron expression driving rebuilds.
    pub schedule: String,
    pub sections: SectionPlan,
}

/// The fixed allow-list of site contexts this deployment serves.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: BTreeMap<SiteContext, Arc<SiteProfile>>,
}

impl SiteRegistry {
    pub fn new(profiles: impl IntoIterator<Item = SiteProfile>) -> Self {
        let sites = profiles
            .into_iter()
            .map(|profile| (profile.context.clone(), Arc::new(profile)))
            .collect();
        Self { sites }
    }

    /// Look up a site by its raw identifier; unknown or malformed input yields `None`.
    pub fn get(&self, raw: &str) -> Option<Arc<SiteProfile>> {
        let context = SiteContext::parse(raw).ok()?;
        self.sites.get(&context).cloned()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Arc<SiteProfile>> {
        self.sites.values()
    }

    pub fn contexts(&self) -> impl Iterator<Item = &SiteContext> {
        self.sites.keys()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}
