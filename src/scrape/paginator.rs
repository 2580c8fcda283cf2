//! Next-page discovery
//!
//! The paginator only answers "which page comes next"; the page budget is
//! enforced by the task driver.

use scraper::{Html, Selector};
use url::Url;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub enum Paginator {
    /// Never another page
    Dummy,
    /// Attribute `attr` of the first element matching `selector`
    BySelector { selector: Selector, attr: String },
}

impl Paginator {
    /// Absolute URL of the page after `current`, or `None` at the end of the
    /// chain. A link back to `current` (fragments ignored) also ends it.
    pub fn next_page(&self, current: &str, doc: &Html) -> Result<Option<String>> {
        let Paginator::BySelector { selector, attr } = self else {
            return Ok(None);
        };

        let Some(value) = doc
            .select(selector)
            .next()
            .and_then(|el| el.value().attr(attr))
            .map(str::trim)
            .filter(|v| !v.is_empty())
        else {
            return Ok(None);
        };

        let mut base = Url::parse(current).map_err(|source| Error::InvalidUrl {
            url: current.to_string(),
            source,
        })?;
        let mut next = base.join(value).map_err(|source| Error::InvalidUrl {
            url: value.to_string(),
            source,
        })?;

        next.set_fragment(None);
        base.set_fragment(None);
        if next == base {
            return Ok(None);
        }
        Ok(Some(next.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_selector(selector: &str) -> Paginator {
        Paginator::BySelector {
            selector: Selector::parse(selector).unwrap(),
            attr: "href".into(),
        }
    }

    #[test]
    fn test_relative_next_link() {
        let doc = Html::parse_document(r#"<li class="next"><a href="page-2.html">next</a></li>"#);
        let next = by_selector(".next a")
            .next_page("http://books.example.com/catalogue/page-1.html", &doc)
            .unwrap();
        assert_eq!(next.as_deref(), Some("http://books.example.com/catalogue/page-2.html"));
    }

    #[test]
    fn test_end_of_chain() {
        let doc = Html::parse_document(r#"<li class="previous"><a href="page-1.html">prev</a></li>"#);
        let paginator = by_selector(".next a");
        assert_eq!(paginator.next_page("http://a.com/page-2.html", &doc).unwrap(), None);
        assert_eq!(Paginator::Dummy.next_page("http://a.com/", &doc).unwrap(), None);
    }

    #[test]
    fn test_self_link_stops() {
        let doc = Html::parse_document(r##"<div class="next"><a href="#">next</a></div>"##);
        let next = by_selector(".next a").next_page("http://a.com/list", &doc).unwrap();
        assert_eq!(next, None);

        let doc = Html::parse_document(r#"<div class="next"><a href="/list">next</a></div>"#);
        let next = by_selector(".next a").next_page("http://a.com/list", &doc).unwrap();
        assert_eq!(next, None);
    }
}
