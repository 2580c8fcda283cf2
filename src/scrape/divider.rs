//! Splitting a page into blocks
//!
//! A block is one repeated record on a page, such as a product card. With
//! [`Divider::Intersection`] the record container is found from the field
//! selectors alone: the closest ancestor shared by every selector's matches
//! is the container, and a `parent>container` selector built from its
//! identity picks out all of its siblings. A container found only once is
//! a list wrapper when several of its children hold matches of the first
//! selector, and a single record otherwise.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};

use crate::error::{BadPayloadKind, Error, Result};

#[derive(Debug, Clone)]
pub enum Divider {
    /// The whole document is a single block
    WholeDocument,
    /// Common-ancestor division over the field selectors
    Intersection(Vec<Selector>),
}

impl Divider {
    pub fn divide<'a>(&self, doc: &'a Html) -> Result<Vec<ElementRef<'a>>> {
        match self {
            Divider::WholeDocument => Ok(vec![doc.root_element()]),
            Divider::Intersection(selectors) => divide_by_intersection(doc, selectors),
        }
    }
}

fn divide_by_intersection<'a>(doc: &'a Html, selectors: &[Selector]) -> Result<Vec<ElementRef<'a>>> {
    let container =
        common_ancestor(doc, selectors).ok_or(Error::BadPayload(BadPayloadKind::NoSelectors))?;

    let source = container_selector(container);
    let selector = Selector::parse(&source).map_err(|_| Error::InvalidSelector {
        selector: source.clone(),
    })?;
    let items: Vec<ElementRef<'a>> = doc.select(&selector).collect();

    match items.as_slice() {
        [] => Err(Error::BadPayload(BadPayloadKind::NoSelectors)),
        [single] => {
            let children: Vec<ElementRef<'a>> =
                single.children().filter_map(ElementRef::wrap).collect();
            let records = children
                .iter()
                .filter(|child| child.select(&selectors[0]).next().is_some())
                .count();
            if records > 1 {
                Ok(children)
            } else {
                Ok(vec![*single])
            }
        }
        _ => Ok(items),
    }
}

/// Ancestors of every match of `selector`, closest first, without repeats.
fn ancestors<'a>(doc: &'a Html, selector: &Selector) -> Vec<ElementRef<'a>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for el in doc.select(selector) {
        for ancestor in el.ancestors().filter_map(ElementRef::wrap) {
            if seen.insert(ancestor.id()) {
                out.push(ancestor);
            }
        }
    }
    out
}

/// Closest ancestor of the first selector's matches shared by all others.
fn common_ancestor<'a>(doc: &'a Html, selectors: &[Selector]) -> Option<ElementRef<'a>> {
    let (first, rest) = selectors.split_first()?;
    let others: Vec<HashSet<_>> = rest
        .iter()
        .map(|sel| ancestors(doc, sel).iter().map(|el| el.id()).collect())
        .collect();
    ancestors(doc, first)
        .into_iter()
        .find(|el| others.iter().all(|set| set.contains(&el.id())))
}

fn container_selector(container: ElementRef<'_>) -> String {
    let own = identity(container);
    match container.parent().and_then(ElementRef::wrap) {
        Some(parent) => format!("{}>{}", identity(parent), own),
        None => own,
    }
}

/// `.class.class`, else `#id`, else the tag name.
fn identity(el: ElementRef<'_>) -> String {
    let classes: Vec<String> = el.value().classes().map(escape_ident).collect();
    if !classes.is_empty() {
        return format!(".{}", classes.join("."));
    }
    match el.value().id() {
        Some(id) if !id.trim().is_empty() => format!("#{}", escape_ident(id.trim())),
        _ => el.value().name().to_string(),
    }
}

/// Escape a class name or id for use in a CSS selector.
fn escape_ident(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    for (i, c) in ident.chars().enumerate() {
        let leading_digit = c.is_ascii_digit()
            && (i == 0 || (i == 1 && ident.starts_with('-')));
        if leading_digit {
            out.push_str(&format!("\\{:x} ", c as u32));
        } else if c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
        <html><body>
          <header class="nav"><a href="/">Home</a></header>
          <ol class="row">
            <li class="col"><article class="product_pod">
              <h3><a href="a.html">Alpha</a></h3><p class="price_color">£1.00</p>
            </article></li>
            <li class="col"><article class="product_pod">
              <h3><a href="b.html">Beta</a></h3><p class="price_color">£2.00</p>
            </article></li>
            <li class="col"><article class="product_pod">
              <h3><a href="c.html">Gamma</a></h3><p class="price_color">£3.00</p>
            </article></li>
          </ol>
          <footer><p class="price_color">not a product</p></footer>
        </body></html>"#;

    fn selectors(sources: &[&str]) -> Vec<Selector> {
        sources.iter().map(|s| Selector::parse(s).unwrap()).collect()
    }

    #[test]
    fn test_one_block_per_card() {
        let doc = Html::parse_document(CATALOG);
        let divider = Divider::Intersection(selectors(&["h3 a", ".price_color"]));
        let blocks = divider.divide(&doc).unwrap();
        assert_eq!(blocks.len(), 3);
        assert!(blocks.iter().all(|b| b.value().name() == "article"));
    }

    #[test]
    fn test_single_list_container_uses_children() {
        let doc = Html::parse_document(
            r#"<div class="wrap"><ul id="list"><li><b>1</b></li><li>2</li><li><b>3</b></li></ul></div>"#,
        );
        let blocks = Divider::Intersection(selectors(&["b", "li"])).divide(&doc).unwrap();
        assert_eq!(blocks.len(), 3);
        assert!(blocks.iter().all(|b| b.value().name() == "li"));
    }

    #[test]
    fn test_single_record_page() {
        let doc = Html::parse_document(
            r#"<div class="book"><h1>Title</h1><p class="price">£1</p><p class="stock">2</p></div>"#,
        );
        let blocks = Divider::Intersection(selectors(&["h1", ".price", ".stock"]))
            .divide(&doc)
            .unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].value().attr("class"), Some("book"));
    }

    #[test]
    fn test_no_common_structure() {
        let doc = Html::parse_document("<p>nothing here</p>");
        let err = Divider::Intersection(selectors(&[".missing"]))
            .divide(&doc)
            .unwrap_err();
        assert!(matches!(err, Error::BadPayload(BadPayloadKind::NoSelectors)));
    }

    #[test]
    fn test_whole_document() {
        let doc = Html::parse_document(CATALOG);
        let blocks = Divider::WholeDocument.divide(&doc).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].value().name(), "html");
    }

    #[test]
    fn test_escape_ident() {
        assert_eq!(escape_ident("col-md-3"), "col-md-3");
        assert_eq!(escape_ident("md:flex"), "md\\:flex");
        assert_eq!(escape_ident("2col"), "\\32 col");
    }
}
