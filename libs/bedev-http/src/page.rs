//! Hosting page access for clients embedded in a website

use std::borrow::Cow;

/// Read-only view of the page the client runs in
pub trait PageDocument: Send + Sync {
    /// Value of `attribute` on the first `<meta name="{name}">` element
    fn meta_attribute(&self, name: &str, attribute: &str) -> Option<String>;
}

/// HTML document parsed with `tl`
///
/// Holds the source text; queries parse it on demand so the type stays `'static`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlPage {
    source: String,
}

impl HtmlPage {
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Text of the first `<title>` element
    #[must_use]
    pub fn title(&self) -> Option<String> {
        let dom = self.parse()?;
        let parser = dom.parser();
        dom.nodes()
            .iter()
            .filter_map(tl::Node::as_tag)
            .find(|tag| tag.name().as_utf8_str().eq_ignore_ascii_case("title"))
            .map(|tag| tag.inner_text(parser).trim().to_owned())
    }

    fn parse(&self) -> Option<tl::VDom<'_>> {
        match tl::parse(&self.source, tl::ParserOptions::default()) {
            Ok(dom) => Some(dom),
            Err(err) => {
                tracing::debug!(error = ?err, "failed to parse HTML document");
                None
            }
        }
    }
}

impl PageDocument for HtmlPage {
    fn meta_attribute(&self, name: &str, attribute: &str) -> Option<String> {
        let dom = self.parse()?;
        dom.nodes()
            .iter()
            .filter_map(tl::Node::as_tag)
            .filter(|tag| tag.name().as_utf8_str().eq_ignore_ascii_case("meta"))
            .find(|tag| {
                tag.attributes()
                    .get("name")
                    .flatten()
                    .is_some_and(|value| value.as_utf8_str() == name)
            })
            .and_then(|tag| {
                tag.attributes()
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(attribute))
                    .and_then(|(_, value)| value.map(Cow::into_owned))
            })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <title> Home - Roblox </title>
    <meta charset="utf-8">
    <meta name="description" content="Home">
    <meta name="csrf-token" data-token="Tk9ZW4">
  </head>
  <body><div id="app"></div></body>
</html>"#;

    #[test]
    fn test_meta_attribute() {
        let page = HtmlPage::new(PAGE);
        assert_eq!(
            page.meta_attribute("csrf-token", "data-token").as_deref(),
            Some("Tk9ZW4")
        );
        assert_eq!(
            page.meta_attribute("description", "content").as_deref(),
            Some("Home")
        );
        assert_eq!(page.meta_attribute("csrf-token", "content"), None);
        assert_eq!(page.meta_attribute("missing", "data-token"), None);
    }

    #[test]
    fn test_title() {
        let page = HtmlPage::new(PAGE);
        assert_eq!(page.title().as_deref(), Some("Home - Roblox"));
        assert_eq!(HtmlPage::new("<p>hi</p>").title(), None);
    }
}
