//! Output encoders: JSON, CSV and XML.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::results::{Block, Results};

/// Separator for array values in CSV cells.
const CSV_LIST_SEPARATOR: &str = ";";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoder {
    /// Flat array of blocks, or an array of pages when `paginate` is set
    Json { paginate: bool },
    /// One row per block under a header of `columns`
    Csv { columns: Vec<String> },
    /// `<items>` with one `<item>` per block
    Xml,
}

impl Encoder {
    pub fn for_format(format: &str, columns: Vec<String>, paginate_results: bool) -> Result<Self> {
        match format.trim().to_lowercase().as_str() {
            "json" => Ok(Encoder::Json {
                paginate: paginate_results,
            }),
            "csv" => Ok(Encoder::Csv { columns }),
            "xml" => Ok(Encoder::Xml),
            other => Err(Error::InvalidOutputFormat(other.to_string())),
        }
    }

    pub fn encode(&self, results: &Results) -> Result<Vec<u8>> {
        match self {
            Encoder::Json { paginate: true } => Ok(serde_json::to_vec(&results.pages)?),
            Encoder::Json { paginate: false } => Ok(serde_json::to_vec(&results.all_blocks())?),
            Encoder::Csv { columns } => encode_csv(columns, results),
            Encoder::Xml => encode_xml(results),
        }
    }
}

fn encode_csv(columns: &[String], results: &Results) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns)?;
    for block in results.all_blocks() {
        writer.write_record(columns.iter().map(|c| cell(block, c)))?;
    }
    writer
        .into_inner()
        .map_err(|e| Error::Csv(e.into_error().into()))
}

/// Value for `column`: the part of that name, or key `child` of the
/// structured part `parent` for joined `parent_child` columns.
fn cell(block: &Block, column: &str) -> String {
    if let Some(value) = block.get(column) {
        return render(value);
    }
    for (name, value) in block {
        let Some(child) = column
            .strip_prefix(name.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
        else {
            continue;
        };
        match value {
            Value::Object(map) => return map.get(child).map(render).unwrap_or_default(),
            Value::Array(items) => {
                return items
                    .iter()
                    .filter_map(|item| item.get(child))
                    .map(render)
                    .collect::<Vec<_>>()
                    .join(CSV_LIST_SEPARATOR)
            }
            _ => {}
        }
    }
    String::new()
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(items) => items
            .iter()
            .map(render)
            .collect::<Vec<_>>()
            .join(CSV_LIST_SEPARATOR),
        Value::Object(_) => value.to_string(),
    }
}

fn encode_xml(results: &Results) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    emit(&mut writer, Event::Start(BytesStart::new("items")))?;
    for block in results.all_blocks() {
        emit(&mut writer, Event::Start(BytesStart::new("item")))?;
        for (name, value) in block {
            write_xml_value(&mut writer, &element_name(name), value)?;
        }
        emit(&mut writer, Event::End(BytesEnd::new("item")))?;
    }
    emit(&mut writer, Event::End(BytesEnd::new("items")))?;
    Ok(writer.into_inner())
}

/// Arrays repeat the element, maps nest one element per key.
fn write_xml_value(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> Result<()> {
    match value {
        Value::Array(items) => {
            for item in items {
                write_xml_value(writer, name, item)?;
            }
        }
        Value::Object(map) => {
            emit(writer, Event::Start(BytesStart::new(name)))?;
            for (key, child) in map {
                write_xml_value(writer, &element_name(key), child)?;
            }
            emit(writer, Event::End(BytesEnd::new(name)))?;
        }
        scalar => {
            emit(writer, Event::Start(BytesStart::new(name)))?;
            emit(writer, Event::Text(BytesText::new(&render(scalar))))?;
            emit(writer, Event::End(BytesEnd::new(name)))?;
        }
    }
    Ok(())
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::Xml(e.to_string()))
}

/// Part names are free text; XML element names are not.
fn element_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !out.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn results() -> Results {
        let block = |v: Value| v.as_object().cloned().unwrap();
        Results {
            pages: vec![
                vec![
                    block(json!({
                        "Title_text": "A Light in the Attic",
                        "Price_regex": "51.77",
                        "Link_link": {"href": "http://a.com/1", "text": "one"}
                    })),
                    block(json!({
                        "Title_text": "Tipping the Velvet",
                        "Tags_text": ["poetry", "classics"],
                        "Stock_count": 3
                    })),
                ],
                vec![block(json!({"Title_text": "Soumission & <co>"}))],
            ],
        }
    }

    fn columns() -> Vec<String> {
        ["Title_text", "Price_regex", "Link_link_href", "Link_link_text", "Tags_text", "Stock_count"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_unknown_format() {
        let err = Encoder::for_format("yaml", vec![], false).unwrap_err();
        assert!(matches!(err, Error::InvalidOutputFormat(f) if f == "yaml"));
    }

    #[test]
    fn test_json_flat_and_paged() {
        let flat = Encoder::for_format("JSON", vec![], false).unwrap().encode(&results()).unwrap();
        let flat: Value = serde_json::from_slice(&flat).unwrap();
        assert_eq!(flat.as_array().unwrap().len(), 3);
        assert_eq!(flat[0]["Price_regex"], json!("51.77"));

        let paged = Encoder::for_format("json", vec![], true).unwrap().encode(&results()).unwrap();
        let paged: Value = serde_json::from_slice(&paged).unwrap();
        assert_eq!(paged.as_array().unwrap().len(), 2);
        assert_eq!(paged[1][0]["Title_text"], json!("Soumission & <co>"));
    }

    #[test]
    fn test_csv_columns() {
        let out = Encoder::for_format("csv", columns(), false).unwrap().encode(&results()).unwrap();
        let mut reader = csv::Reader::from_reader(out.as_slice());
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header, columns());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[0][1], "51.77");
        assert_eq!(&rows[0][2], "http://a.com/1");
        assert_eq!(&rows[0][3], "one");
        assert_eq!(&rows[1][4], "poetry;classics");
        assert_eq!(&rows[1][5], "3");
        assert_eq!(&rows[2][0], "Soumission & <co>");
        assert_eq!(&rows[2][1], "");
    }

    #[test]
    fn test_xml_items() {
        let out = Encoder::for_format("xml", vec![], false).unwrap().encode(&results()).unwrap();
        let xml = String::from_utf8(out).unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?><items><item>"#));
        assert!(xml.ends_with("</item></items>"));
        assert_eq!(xml.matches("<item>").count(), 3);
        assert!(xml.contains("<Price_regex>51.77</Price_regex>"));
        assert!(xml.contains("<Link_link><href>http://a.com/1</href><text>one</text></Link_link>"));
        assert!(xml.contains("<Tags_text>poetry</Tags_text><Tags_text>classics</Tags_text>"));
        assert!(xml.contains("<Title_text>Soumission &amp; &lt;co&gt;</Title_text>"));
    }

    #[test]
    fn test_element_name() {
        assert_eq!(element_name("Title_text"), "Title_text");
        assert_eq!(element_name("1st price"), "_1st_price");
    }
}
