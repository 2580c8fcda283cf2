//! Text filters applied after extraction: trim, upperCase, lowerCase,
//! capitalize.

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Trim,
    UpperCase,
    LowerCase,
    /// First letter of each word in upper case
    Capitalize,
}

impl Filter {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "trim" => Some(Filter::Trim),
            "uppercase" => Some(Filter::UpperCase),
            "lowercase" => Some(Filter::LowerCase),
            "capitalize" => Some(Filter::Capitalize),
            _ => None,
        }
    }

    /// Parse a list of filter names, logging and dropping unknown ones.
    pub fn parse_all(names: &[String]) -> Vec<Self> {
        names
            .iter()
            .filter_map(|name| {
                let filter = Self::parse(name);
                if filter.is_none() {
                    warn!(filter = %name, "unknown filter");
                }
                filter
            })
            .collect()
    }

    pub fn apply(self, text: &str) -> String {
        match self {
            Filter::Trim => text.trim().to_string(),
            Filter::UpperCase => text.to_uppercase(),
            Filter::LowerCase => text.to_lowercase(),
            Filter::Capitalize => capitalize(text),
        }
    }
}

pub(crate) fn apply_all(filters: &[Filter], text: &str) -> String {
    filters
        .iter()
        .fold(text.to_string(), |acc, filter| filter.apply(&acc))
}

fn capitalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if at_word_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_in_order() {
        let filters = Filter::parse_all(&["trim".into(), "lowerCase".into(), "capitalize".into()]);
        assert_eq!(apply_all(&filters, "  JOHN o'NEIL smith "), "John O'neil Smith");
    }

    #[test]
    fn test_unknown_filter_dropped() {
        let filters = Filter::parse_all(&["reverse".into(), "UPPERCASE".into()]);
        assert_eq!(filters, vec![Filter::UpperCase]);
    }
}
