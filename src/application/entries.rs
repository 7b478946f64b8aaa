//! Builds localized URL entries from catalog items and literal paths.
//!
//! Every path is composed as `{locale}/{prefix}/{slug}[/{suffix}]` with empty
//! segments dropped, then appended to the site's base URL with every segment
//! percent-encoded. Items without a slug for a locale simply produce nothing
//! for that locale.

use time::OffsetDateTime;
use url::Url;

use crate::domain::{
    content::ContentItem,
    entry::{ChangeFrequency, UrlEntry},
};

/// Change frequency advertised for every generated entry.
pub const DEFAULT_CHANGE_FREQUENCY: ChangeFrequency = ChangeFrequency::Daily;

/// Entry factory bound to one site's base URL and locale list.
#[derive(Debug, Clone, Copy)]
pub struct EntryBuilder<'a> {
    base_url: &'a str,
    locales: &'a [String],
}

impl<'a> EntryBuilder<'a> {
    pub fn new(base_url: &'a str, locales: &'a [String]) -> Self {
        Self { base_url, locales }
    }

    pub fn locales(&self) -> &'a [String] {
        self.locales
    }

    /// Absolute URL for the given path segments under `locale`.
    pub fn location(&self, locale: &str, segments: &[&str]) -> String {
        let parts: Vec<&str> = std::iter::once(locale)
            .chain(segments.iter().copied())
            .flat_map(|segment| segment.split('/'))
            .filter(|part| !part.is_empty())
            .collect();

        let base = self.base_url.trim_end_matches('/');
        if parts.is_empty() {
            return base.to_string();
        }

        let Ok(mut url) = Url::parse(base) else {
            return format!("{base}/{}", parts.join("/"));
        };
        match url.path_segments_mut() {
            Ok(mut path) => {
                path.pop_if_empty().extend(parts);
            }
            Err(()) => return format!("{base}/{}", parts.join("/")),
        }
        url.into()
    }

    /// Detail entries for `item` in every locale: one per suffix, or a single
    /// suffix-less entry when `suffixes` is empty.
    pub fn for_item(
        &self,
        item: &ContentItem,
        prefix: &str,
        suffixes: &[String],
    ) -> Vec<UrlEntry> {
        self.locales
            .iter()
            .flat_map(|locale| self.for_item_in_locale(item, locale, prefix, suffixes))
            .collect()
    }

    /// Detail entries for `item` in a single locale.
    pub fn for_item_in_locale(
        &self,
        item: &ContentItem,
        locale: &str,
        prefix: &str,
        suffixes: &[String],
    ) -> Vec<UrlEntry> {
        let Some(slug) = item.slug(locale) else {
            return Vec::new();
        };

        if suffixes.is_empty() {
            return vec![self.content_entry(item, self.location(locale, &[prefix, slug]))];
        }

        suffixes
            .iter()
            .map(|suffix| {
                let location = self.location(locale, &[prefix, slug, suffix.as_str()]);
                self.content_entry(item, location)
            })
            .collect()
    }

    /// Entries publishing `item` under literal `paths` in `locale`, e.g. the home
    /// page reachable at both `/nl` and `/nl/home`.
    pub fn for_item_at_paths(
        &self,
        item: &ContentItem,
        locale: &str,
        paths: &[String],
    ) -> Vec<UrlEntry> {
        if item.slug(locale).is_none() {
            return Vec::new();
        }

        paths
            .iter()
            .map(|path| self.content_entry(item, self.location(locale, &[path.as_str()])))
            .collect()
    }

    /// Entries for a page not backed by a single item, stamped with `at`.
    pub fn custom(&self, path: &str, at: OffsetDateTime) -> Vec<UrlEntry> {
        self.locales
            .iter()
            .map(|locale| {
                UrlEntry::new(
                    self.location(locale, &[path]),
                    Some(at),
                    Some(DEFAULT_CHANGE_FREQUENCY),
                )
            })
            .collect()
    }

    fn content_entry(&self, item: &ContentItem, location: String) -> UrlEntry {
        UrlEntry::new(
            location,
            item.last_modified(),
            Some(DEFAULT_CHANGE_FREQUENCY),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use time::macros::datetime;

    use super::*;

    const BASE: &str = "https://am.example.org";

    fn item(slugs: &[(&str, &str)]) -> ContentItem {
        ContentItem {
            id: "item-1".to_string(),
            content_type: "vision".to_string(),
            slugs: slugs
                .iter()
                .map(|(locale, slug)| (locale.to_string(), slug.to_string()))
                .collect(),
            published: true,
            deleted: false,
            created_at: Some(datetime!(2022-01-01 00:00 UTC)),
            last_modified_at: Some(datetime!(2023-01-01 00:00 UTC)),
            relations: BTreeMap::new(),
        }
    }

    fn locales(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn home_page_resolves_to_locale_root() {
        let locales = locales(&["nl"]);
        let builder = EntryBuilder::new(BASE, &locales);
        let home = item(&[("nl", "home")]);

        let entries = builder.for_item_at_paths(&home, "nl", &["".to_string()]);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].location, "https://am.example.org/nl");
        assert_eq!(
            entries[0].last_modified_iso().as_deref(),
            Some("2023-01-01T00:00:00.000Z")
        );
        assert_eq!(entries[0].change_frequency, Some(ChangeFrequency::Daily));
    }

    #[test]
    fn missing_locale_slug_yields_nothing_for_that_locale() {
        let locales = locales(&["nl", "en"]);
        let builder = EntryBuilder::new(BASE, &locales);
        let vision = item(&[("nl", "haven")]);

        let entries = builder.for_item(&vision, "projecten", &[]);

        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].location,
            "https://am.example.org/nl/projecten/haven"
        );
        assert!(
            builder
                .for_item_at_paths(&vision, "en", &["x".to_string()])
                .is_empty()
        );
    }

    #[test]
    fn suffixes_expand_each_item() {
        let locales = locales(&["nl"]);
        let builder = EntryBuilder::new(BASE, &locales);
        let vision = item(&[("nl", "haven")]);
        let suffixes = vec!["over".to_string(), "tijdlijn".to_string()];

        let locations: Vec<_> = builder
            .for_item(&vision, "projecten", &suffixes)
            .into_iter()
            .map(|entry| entry.location)
            .collect();

        assert_eq!(
            locations,
            [
                "https://am.example.org/nl/projecten/haven/over",
                "https://am.example.org/nl/projecten/haven/tijdlijn",
            ]
        );
    }

    #[test]
    fn empty_segments_and_trailing_slashes_are_collapsed() {
        let locales = locales(&["nl"]);
        let builder = EntryBuilder::new("https://am.example.org/", &locales);

        assert_eq!(
            builder.location("nl", &["", "doe-mee/", ""]),
            "https://am.example.org/nl/doe-mee"
        );
        assert_eq!(builder.location("", &[""]), "https://am.example.org");
    }

    #[test]
    fn slugs_are_percent_encoded_as_path_segments() {
        let locales = locales(&["nl"]);
        let builder = EntryBuilder::new(BASE, &locales);

        assert_eq!(
            builder.location("nl", &["projecten", "wat? waar#nu"]),
            "https://am.example.org/nl/projecten/wat%3F%20waar%23nu"
        );
        let location = builder.location("nl", &["over-ons", "café"]);
        let parsed = Url::parse(&location).expect("well-formed location");
        assert_eq!(parsed.query(), None);
        assert_eq!(parsed.fragment(), None);
        assert_eq!(parsed.path(), "/nl/over-ons/caf%C3%A9");
    }

    #[test]
    fn base_url_path_is_kept_in_front_of_the_locale() {
        let locales = locales(&["nl"]);
        let builder = EntryBuilder::new("https://example.org/am", &locales);

        assert_eq!(
            builder.location("nl", &["projecten", "haven"]),
            "https://example.org/am/nl/projecten/haven"
        );
    }

    #[test]
    fn last_modified_falls_back_to_created_then_null() {
        let locales = locales(&["nl"]);
        let builder = EntryBuilder::new(BASE, &locales);
        let mut page = item(&[("nl", "contact")]);
        page.last_modified_at = None;

        let entries = builder.for_item(&page, "", &[]);
        assert_eq!(
            entries[0].last_modified_iso().as_deref(),
            Some("2022-01-01T00:00:00.000Z")
        );

        page.created_at = None;
        let entries = builder.for_item(&page, "", &[]);
        assert_eq!(entries[0].last_modified, None);
    }

    #[test]
    fn custom_entries_use_the_rebuild_time() {
        let locales = locales(&["nl", "en"]);
        let builder = EntryBuilder::new(BASE, &locales);
        let now = datetime!(2024-03-10 04:00 UTC);

        let entries = builder.custom("in-de-buurt", now);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].location, "https://am.example.org/nl/in-de-buurt");
        assert_eq!(entries[1].location, "https://am.example.org/en/in-de-buurt");
        assert!(entries.iter().all(|entry| entry.last_modified == Some(now)));
        assert!(
            entries
                .iter()
                .all(|entry| entry.change_frequency == Some(ChangeFrequency::Daily))
        );
    }
}
