//! Text content extraction

use scraper::ElementRef;
use serde::Deserialize;
use serde_json::Value;

use super::filters::{apply_all, Filter};
use super::{collapse, element_text, ExtractContext, Extractor};
use crate::error::ExtractError;

/// Trimmed text of every selected element.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Text {
    #[serde(skip)]
    pub filters: Vec<Filter>,
    /// Keep elements whose text is empty
    pub include_if_empty: bool,
}

impl Extractor for Text {
    fn extract(
        &self,
        selection: &[ElementRef<'_>],
        _ctx: &ExtractContext<'_>,
    ) -> Result<Option<Value>, ExtractError> {
        let values = selection
            .iter()
            .map(|el| apply_all(&self.filters, &element_text(el)))
            .filter(|text| self.include_if_empty || !text.is_empty())
            .map(Value::String)
            .collect();
        Ok(collapse(values))
    }
}
