use scraper::ElementRef;
use serde_json::Value;

use super::{ExtractContext, Extractor};
use crate::error::ExtractError;

/// A fixed value, whatever the selection.
#[derive(Debug, Clone)]
pub struct Const {
    pub value: Value,
}

impl Extractor for Const {
    fn extract(
        &self,
        _selection: &[ElementRef<'_>],
        _ctx: &ExtractContext<'_>,
    ) -> Result<Option<Value>, ExtractError> {
        Ok(Some(self.value.clone()))
    }
}

/// Number of selected elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct Count;

impl Extractor for Count {
    fn extract(
        &self,
        selection: &[ElementRef<'_>],
        _ctx: &ExtractContext<'_>,
    ) -> Result<Option<Value>, ExtractError> {
        Ok(Some(Value::from(selection.len())))
    }
}
