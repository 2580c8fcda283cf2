//! Field extractors
//!
//! Each extractor turns the elements a part's selector matched inside one
//! block into a JSON value, or `None` when the part should be left out of
//! the block.

mod attr_extractor;
mod const_extractor;
mod filters;
mod html_extractor;
mod regex_extractor;
mod text_extractor;

pub use attr_extractor::*;
pub use const_extractor::*;
pub use filters::Filter;
pub use html_extractor::*;
pub use regex_extractor::*;
pub use text_extractor::*;

use std::fmt;
use std::sync::Arc;

use scraper::ElementRef;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;
use url::Url;

use crate::error::{Error, ExtractError, Result};
use crate::payload::ExtractorSpec;

/// State shared by every part of a block.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractContext<'a> {
    /// URL of the page the block came from; relative links resolve against it
    pub base_url: Option<&'a Url>,
}

pub trait Extractor: Send + Sync + fmt::Debug {
    /// Extract a value from the elements selected inside one block.
    fn extract(
        &self,
        selection: &[ElementRef<'_>],
        ctx: &ExtractContext<'_>,
    ) -> std::result::Result<Option<Value>, ExtractError>;

    /// Keys of the map this extractor produces, empty for scalar values.
    /// CSV output turns them into `part_key` columns.
    fn columns(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Build the extractor for one `kind` of a field.
///
/// Returns `Ok(None)` for unknown kinds; the caller decides how loudly to
/// skip them.
pub fn build(field: &str, kind: &str, spec: &ExtractorSpec) -> Result<Option<Arc<dyn Extractor>>> {
    let filters = Filter::parse_all(&spec.filters);
    let params = &spec.params;

    let extractor: Arc<dyn Extractor> = match kind.to_lowercase().as_str() {
        "text" => Arc::new(Text {
            filters,
            ..fill_params(field, kind, params)
        }),
        "href" | "src" => Arc::new(Attr::resolving(&kind.to_lowercase())),
        "alt" => Arc::new(Attr {
            filters,
            ..Attr::plain("alt")
        }),
        "width" | "height" => Arc::new(Attr::plain(&kind.to_lowercase())),
        "link" => Arc::new(Link { filters }),
        "image" => Arc::new(Image { filters }),
        "regex" => Arc::new(Regex::from_params(field, params)?),
        "const" => {
            let value = params.get("value").cloned().ok_or_else(|| Error::MissingParam {
                field: field.to_string(),
                extractor: kind.to_string(),
                param: "value",
            })?;
            Arc::new(Const { value })
        }
        "count" => Arc::new(Count),
        "html" => Arc::new(Html),
        "outerhtml" => Arc::new(OuterHtml),
        _ => return Ok(None),
    };
    Ok(Some(extractor))
}

/// Overlay a params map onto an extractor's settings. Mismatched values are
/// logged and the defaults kept.
pub(crate) fn fill_params<T: DeserializeOwned + Default>(
    field: &str,
    kind: &str,
    params: &Map<String, Value>,
) -> T {
    match serde_json::from_value(Value::Object(params.clone())) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(field, extractor = kind, "ignoring params: {}", e);
            T::default()
        }
    }
}

/// Zero values are "no value", one is returned as-is, several become an array.
pub(crate) fn collapse(mut values: Vec<Value>) -> Option<Value> {
    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(Value::Array(values)),
    }
}

/// Trimmed text content of an element.
pub(crate) fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Resolve `value` against the page URL when one is known.
pub(crate) fn resolve(value: &str, base: Option<&Url>) -> std::result::Result<String, ExtractError> {
    match base {
        Some(base) => base
            .join(value.trim())
            .map(String::from)
            .map_err(|source| ExtractError::Resolve {
                value: value.to_string(),
                base: base.to_string(),
                source,
            }),
        None => Ok(value.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html as Document, Selector};
    use serde_json::json;

    fn spec(params: Value, filters: &[&str]) -> ExtractorSpec {
        ExtractorSpec {
            types: vec![],
            params: params.as_object().cloned().unwrap_or_default(),
            filters: filters.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn run(html: &str, selector: &str, extractor: &dyn Extractor, base: Option<&Url>) -> Option<Value> {
        let doc = Document::parse_document(html);
        let sel = Selector::parse(selector).unwrap();
        let selection: Vec<_> = doc.select(&sel).collect();
        extractor
            .extract(&selection, &ExtractContext { base_url: base })
            .unwrap()
    }

    #[test]
    fn test_unknown_kind_is_skipped() {
        assert!(build("F", "path", &spec(json!({}), &[])).unwrap().is_none());
    }

    #[test]
    fn test_regex_requires_pattern() {
        let err = build("Price", "regex", &spec(json!({}), &[])).unwrap_err();
        assert!(matches!(err, Error::MissingParam { param: "regexp", .. }));
        let err = build("Price", "regex", &spec(json!({"regexp": "(["}), &[])).unwrap_err();
        assert!(matches!(err, Error::InvalidRegex { .. }));
    }

    #[test]
    fn test_const_requires_value() {
        let err = build("C", "const", &spec(json!({}), &[])).unwrap_err();
        assert!(matches!(err, Error::MissingParam { param: "value", .. }));
    }

    #[test]
    fn test_text_with_filters() {
        let ext = build("T", "text", &spec(json!({}), &["upperCase"])).unwrap().unwrap();
        let value = run("<p class='t'>  hello world </p>", ".t", ext.as_ref(), None);
        assert_eq!(value, Some(json!("HELLO WORLD")));
    }

    #[test]
    fn test_mistyped_params_keep_defaults() {
        let ext = build("T", "text", &spec(json!({"includeIfEmpty": "yes"}), &[]))
            .unwrap()
            .unwrap();
        assert_eq!(run("<p class='t'> </p>", ".t", ext.as_ref(), None), None);
    }

    #[test]
    fn test_href_resolves_relative_links() {
        let base = Url::parse("http://shop.example.com/catalog/page-1.html").unwrap();
        let ext = build("L", "href", &spec(json!({}), &[])).unwrap().unwrap();
        let html = r#"<a href="item-1.html">1</a><a href="/item-2.html">2</a>"#;
        assert_eq!(
            run(html, "a", ext.as_ref(), Some(&base)),
            Some(json!([
                "http://shop.example.com/catalog/item-1.html",
                "http://shop.example.com/item-2.html"
            ]))
        );
    }

    #[test]
    fn test_count_and_const() {
        let html = "<ul><li>a</li><li>b</li><li>c</li></ul>";
        let count = build("N", "count", &spec(json!({}), &[])).unwrap().unwrap();
        assert_eq!(run(html, "li", count.as_ref(), None), Some(json!(3)));

        let c = build("C", "const", &spec(json!({"value": {"k": 1}}), &[])).unwrap().unwrap();
        assert_eq!(run(html, "li", c.as_ref(), None), Some(json!({"k": 1})));
    }

    #[test]
    fn test_html_variants() {
        let html = "<div class='d'><b>x</b></div>";
        let inner = build("H", "html", &spec(json!({}), &[])).unwrap().unwrap();
        assert_eq!(run(html, ".d", inner.as_ref(), None), Some(json!("<b>x</b>")));
        let outer = build("H", "outerHtml", &spec(json!({}), &[])).unwrap().unwrap();
        assert_eq!(
            run(html, ".d", outer.as_ref(), None),
            Some(json!(r#"<div class="d"><b>x</b></div>"#))
        );
    }
}
