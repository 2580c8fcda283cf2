//! Regular expression extraction

use regex::Regex as Pattern;
use scraper::ElementRef;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{collapse, element_text, fill_params, ExtractContext, Extractor};
use crate::error::{Error, ExtractError, Result};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RegexParams {
    regexp: Option<String>,
    subexpression: Option<usize>,
    /// Match against inner HTML instead of text
    html: bool,
    include_if_empty: bool,
}

/// First match of a pattern in each selected element.
///
/// Returns capture group `subexpression`, which defaults to 1 when the
/// pattern has groups and to the whole match otherwise.
#[derive(Debug, Clone)]
pub struct Regex {
    pattern: Pattern,
    subexpression: usize,
    html: bool,
    include_if_empty: bool,
}

impl Regex {
    pub(crate) fn from_params(field: &str, params: &Map<String, Value>) -> Result<Self> {
        let regexp = params
            .get("regexp")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MissingParam {
                field: field.to_string(),
                extractor: "regex".to_string(),
                param: "regexp",
            })?;
        let pattern = Pattern::new(regexp).map_err(|source| Error::InvalidRegex {
            field: field.to_string(),
            source,
        })?;

        let settings: RegexParams = fill_params(field, "regex", params);
        let default_group = usize::from(pattern.captures_len() > 1);
        Ok(Self {
            subexpression: settings
                .subexpression
                .unwrap_or(default_group)
                .min(pattern.captures_len() - 1),
            pattern,
            html: settings.html,
            include_if_empty: settings.include_if_empty,
        })
    }

    fn find(&self, haystack: &str) -> Option<String> {
        self.pattern
            .captures(haystack)
            .and_then(|caps| caps.get(self.subexpression))
            .map(|m| m.as_str().to_string())
    }
}

impl Extractor for Regex {
    fn extract(
        &self,
        selection: &[ElementRef<'_>],
        _ctx: &ExtractContext<'_>,
    ) -> std::result::Result<Option<Value>, ExtractError> {
        let values = selection
            .iter()
            .filter_map(|el| {
                let haystack = if self.html {
                    el.inner_html()
                } else {
                    element_text(el)
                };
                match self.find(&haystack) {
                    Some(found) => Some(found),
                    None if self.include_if_empty => Some(String::new()),
                    None => None,
                }
            })
            .map(Value::String)
            .collect();
        Ok(collapse(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};
    use serde_json::json;

    fn extract(html: &str, params: Value) -> Option<Value> {
        let doc = Html::parse_document(html);
        let sel = Selector::parse(".v").unwrap();
        let selection: Vec<_> = doc.select(&sel).collect();
        Regex::from_params("Price", params.as_object().unwrap())
            .unwrap()
            .extract(&selection, &ExtractContext::default())
            .unwrap()
    }

    #[test]
    fn test_price_group() {
        let value = extract(
            r#"<p class="v">£51.77</p>"#,
            json!({"regexp": "([\\d\\.]+)"}),
        );
        assert_eq!(value, Some(json!("51.77")));
    }

    #[test]
    fn test_whole_match_without_groups() {
        let value = extract(r#"<p class="v">In stock (22 available)</p>"#, json!({"regexp": "\\d+"}));
        assert_eq!(value, Some(json!("22")));
    }

    #[test]
    fn test_no_match() {
        let html = r#"<p class="v">none</p>"#;
        assert_eq!(extract(html, json!({"regexp": "\\d+"})), None);
        assert_eq!(
            extract(html, json!({"regexp": "\\d+", "includeIfEmpty": true})),
            Some(json!(""))
        );
    }
}
