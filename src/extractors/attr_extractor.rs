//! Attribute, link and image extraction

use scraper::ElementRef;
use serde_json::{Map, Value};

use super::filters::{apply_all, Filter};
use super::{collapse, element_text, resolve, ExtractContext, Extractor};
use crate::error::ExtractError;

/// One attribute of every selected element.
#[derive(Debug, Clone)]
pub struct Attr {
    pub attr: String,
    /// Resolve values against the page URL (href, src)
    pub resolve: bool,
    pub filters: Vec<Filter>,
}

impl Attr {
    pub fn plain(attr: &str) -> Self {
        Self {
            attr: attr.to_string(),
            resolve: false,
            filters: Vec::new(),
        }
    }

    pub fn resolving(attr: &str) -> Self {
        Self {
            resolve: true,
            ..Self::plain(attr)
        }
    }
}

impl Extractor for Attr {
    fn extract(
        &self,
        selection: &[ElementRef<'_>],
        ctx: &ExtractContext<'_>,
    ) -> Result<Option<Value>, ExtractError> {
        let mut values = Vec::new();
        for el in selection {
            let Some(raw) = el.value().attr(&self.attr) else {
                continue;
            };
            let value = if self.resolve {
                resolve(raw, ctx.base_url)?
            } else {
                apply_all(&self.filters, raw.trim())
            };
            values.push(Value::String(value));
        }
        Ok(collapse(values))
    }
}

/// `{href, text}` for every selected element carrying an href.
#[derive(Debug, Clone, Default)]
pub struct Link {
    pub filters: Vec<Filter>,
}

impl Extractor for Link {
    fn extract(
        &self,
        selection: &[ElementRef<'_>],
        ctx: &ExtractContext<'_>,
    ) -> Result<Option<Value>, ExtractError> {
        let mut values = Vec::new();
        for el in selection {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let mut link = Map::new();
            link.insert("href".into(), Value::String(resolve(href, ctx.base_url)?));
            link.insert(
                "text".into(),
                Value::String(apply_all(&self.filters, &element_text(el))),
            );
            values.push(Value::Object(link));
        }
        Ok(collapse(values))
    }

    fn columns(&self) -> &'static [&'static str] {
        &["href", "text"]
    }
}

/// `{src, alt}` for every selected element carrying a src.
#[derive(Debug, Clone, Default)]
pub struct Image {
    pub filters: Vec<Filter>,
}

impl Extractor for Image {
    fn extract(
        &self,
        selection: &[ElementRef<'_>],
        ctx: &ExtractContext<'_>,
    ) -> Result<Option<Value>, ExtractError> {
        let mut values = Vec::new();
        for el in selection {
            let Some(src) = el.value().attr("src") else {
                continue;
            };
            let mut image = Map::new();
            image.insert("src".into(), Value::String(resolve(src, ctx.base_url)?));
            let alt = el.value().attr("alt").unwrap_or_default().trim();
            image.insert("alt".into(), Value::String(apply_all(&self.filters, alt)));
            values.push(Value::Object(image));
        }
        Ok(collapse(values))
    }

    fn columns(&self) -> &'static [&'static str] {
        &["src", "alt"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};
    use serde_json::json;
    use url::Url;

    fn select<'a>(doc: &'a Html, selector: &str) -> Vec<ElementRef<'a>> {
        doc.select(&Selector::parse(selector).unwrap()).collect()
    }

    #[test]
    fn test_link_object() {
        let doc = Html::parse_document(r#"<a href="/p/1" title="x"> First </a>"#);
        let base = Url::parse("http://example.com/list").unwrap();
        let ctx = ExtractContext { base_url: Some(&base) };
        let value = Link::default().extract(&select(&doc, "a"), &ctx).unwrap();
        assert_eq!(value, Some(json!({"href": "http://example.com/p/1", "text": "First"})));
    }

    #[test]
    fn test_image_object_and_missing_src() {
        let doc = Html::parse_document(r#"<img src="a.png" alt=" Cat "><img alt="no src">"#);
        let value = Image::default()
            .extract(&select(&doc, "img"), &ExtractContext::default())
            .unwrap();
        assert_eq!(value, Some(json!({"src": "a.png", "alt": "Cat"})));
    }

    #[test]
    fn test_missing_attr_is_none() {
        let doc = Html::parse_document("<span>no attrs</span>");
        let value = Attr::plain("width")
            .extract(&select(&doc, "span"), &ExtractContext::default())
            .unwrap();
        assert_eq!(value, None);
    }
}
