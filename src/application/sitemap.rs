//! Sitemap-protocol XML rendering.
//!
//! Output order follows the input order and the same entries always render to
//! the same bytes.

use crate::domain::entry::UrlEntry;

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str = "http://www.sitemaps.org/schemas/sitemap/0.9 \
                               http://www.sitemaps.org/schemas/sitemap/0.9/sitemap.xsd";

/// Render `entries` into a complete sitemap document.
///
/// Entries without a location are skipped; `lastmod` and `changefreq` are only
/// written when present.
pub fn render_sitemap(entries: &[UrlEntry]) -> String {
    let mut xml = String::with_capacity(256 + entries.len() * 160);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<urlset xmlns=\"{SITEMAP_NS}\" xmlns:xsi=\"{XSI_NS}\" xsi:schemaLocation=\"{SCHEMA_LOCATION}\">\n"
    ));

    for entry in entries.iter().filter(|entry| entry.has_location()) {
        push_entry(&mut xml, entry);
    }

    xml.push_str("</urlset>\n");
    xml
}

fn push_entry(xml: &mut String, entry: &UrlEntry) {
    xml.push_str("  <url>\n");
    xml.push_str(&format!(
        "    <loc>{}</loc>\n",
        escape_xml(entry.location.trim())
    ));
    if let Some(lastmod) = entry.last_modified_iso() {
        xml.push_str(&format!("    <lastmod>{lastmod}</lastmod>\n"));
    }
    if let Some(frequency) = entry.change_frequency {
        xml.push_str(&format!("    <changefreq>{frequency}</changefreq>\n"));
    }
    xml.push_str("  </url>\n");
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::domain::entry::ChangeFrequency;

    fn entry(location: &str) -> UrlEntry {
        UrlEntry::new(
            location,
            Some(datetime!(2023-01-01 00:00 UTC)),
            Some(ChangeFrequency::Daily),
        )
    }

    #[test]
    fn renders_protocol_root_and_children() {
        let xml = render_sitemap(&[entry("https://am.example.org/nl")]);

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset "));
        assert!(xml.contains("xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\""));
        assert!(xml.contains("xsi:schemaLocation=\""));
        assert!(xml.contains(
            "  <url>\n    <loc>https://am.example.org/nl</loc>\n    \
             <lastmod>2023-01-01T00:00:00.000Z</lastmod>\n    \
             <changefreq>daily</changefreq>\n  </url>\n"
        ));
        assert!(xml.ends_with("</urlset>\n"));
    }

    #[test]
    fn optional_children_are_omitted_when_absent() {
        let bare = UrlEntry::new("https://am.example.org/nl/contact", None, None);
        let xml = render_sitemap(&[bare]);

        assert!(xml.contains("<loc>https://am.example.org/nl/contact</loc>"));
        assert!(!xml.contains("<lastmod>"));
        assert!(!xml.contains("<changefreq>"));
    }

    #[test]
    fn empty_locations_are_skipped() {
        let xml = render_sitemap(&[entry(""), entry("  "), entry("https://am.example.org/nl")]);
        assert_eq!(xml.matches("<url>").count(), 1);
    }

    #[test]
    fn rendering_is_reproducible_and_keeps_input_order() {
        let entries = vec![
            entry("https://am.example.org/nl/b"),
            entry("https://am.example.org/nl/a"),
        ];

        let first = render_sitemap(&entries);
        assert_eq!(first, render_sitemap(&entries));

        let b = first.find("/nl/b<").expect("b rendered");
        let a = first.find("/nl/a<").expect("a rendered");
        assert!(b < a);
    }

    #[test]
    fn locations_are_escaped() {
        let xml = render_sitemap(&[entry("https://am.example.org/nl/zoek?q=a&b=<c>")]);
        assert!(xml.contains("<loc>https://am.example.org/nl/zoek?q=a&amp;b=&lt;c&gt;</loc>"));
    }

    #[test]
    fn empty_input_renders_an_empty_urlset() {
        let xml = render_sitemap(&[]);
        assert!(xml.ends_with(">\n</urlset>\n"));
        assert!(!xml.contains("<url>"));
    }
}
