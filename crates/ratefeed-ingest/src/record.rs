//! Header schema and raw records
//!
//! A [`RawRecord`] is one data row zipped against the [`HeaderSchema`]. Values
//! stay as raw strings; type coercion happens downstream. Serialized records
//! are flat JSON objects whose keys appear in header order.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashSet;

/// Ordered field names taken from the first line of the source object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSchema {
    line: String,
    fields: Vec<String>,
}

impl HeaderSchema {
    /// Parse a header line (without its terminator)
    ///
    /// Field names may be quoted. Empty headers and duplicate names are
    /// rejected because they cannot produce a well-formed JSON object.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            return Err("header line is empty".to_string());
        }

        let fields = split_fields(line).ok_or_else(|| "header line is not valid CSV".to_string())?;

        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if !seen.insert(field.as_str()) {
                return Err(format!("duplicate field name '{}'", field));
            }
        }

        Ok(Self {
            line: line.to_string(),
            fields,
        })
    }

    /// The header line as stored in the cursor
    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse one data line against this schema
    ///
    /// Returns `None` when the line is not valid CSV or its column count
    /// differs from the header's.
    pub fn parse_row(&self, line: &str) -> Option<RawRecord> {
        let values = split_fields(line)?;
        if values.len() != self.fields.len() {
            return None;
        }

        Some(RawRecord {
            fields: self.fields.iter().cloned().zip(values).collect(),
        })
    }
}

/// One parsed data row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    fields: Vec<(String, String)>,
}

impl RawRecord {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Queue message body: `{"field": "value", ...}` in header order
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Serialize for RawRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Split a single CSV line into fields, honouring double-quoted values
///
/// A bare `\r` stays inside its field. Anything that still parses as more
/// than one record is rejected.
pub fn split_fields(line: &str) -> Option<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_reader(line.as_bytes());

    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => {},
        Ok(false) | Err(_) => return None,
    }

    let fields = record.iter().map(str::to_string).collect();
    match reader.read_record(&mut record) {
        Ok(false) => Some(fields),
        Ok(true) | Err(_) => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_header_strips_quotes_and_cr() {
        let header = HeaderSchema::parse("\"id\",\"loan_amnt\",term\r").unwrap();
        assert_eq!(header.fields(), &["id", "loan_amnt", "term"]);
        assert_eq!(header.line(), "\"id\",\"loan_amnt\",term");
    }

    #[test]
    fn test_header_rejects_duplicates_and_blank() {
        assert!(HeaderSchema::parse("id,amount,id").is_err());
        assert!(HeaderSchema::parse("   ").is_err());
    }

    #[test]
    fn test_parse_row_respects_quoting() {
        let header = HeaderSchema::parse("id,desc,amount").unwrap();
        let record = header.parse_row("7,\"debt, consolidation\",1000").unwrap();
        assert_eq!(record.get("desc"), Some("debt, consolidation"));
        assert_eq!(record.get("amount"), Some("1000"));
    }

    #[test]
    fn test_parse_row_rejects_column_mismatch() {
        let header = HeaderSchema::parse("a,b,c").unwrap();
        assert!(header.parse_row("1,2").is_none());
        assert!(header.parse_row("1,2,3,4").is_none());
        assert!(header.parse_row("1,,3").is_some());
    }

    #[test]
    fn test_parse_row_keeps_stray_carriage_return_in_field() {
        let header = HeaderSchema::parse("a,b").unwrap();
        assert!(header.parse_row("a,b\rx,y").is_none());

        let header = HeaderSchema::parse("a,b,c").unwrap();
        let record = header.parse_row("a,b\rx,y").unwrap();
        assert_eq!(record.get("b"), Some("b\rx"));
    }

    #[test]
    fn test_json_keeps_header_order_and_raw_strings() {
        let header = HeaderSchema::parse("zeta,alpha,int_rate").unwrap();
        let record = header.parse_row("z,a,13.56").unwrap();
        assert_eq!(
            record.to_json().unwrap(),
            r#"{"zeta":"z","alpha":"a","int_rate":"13.56"}"#
        );
    }
}
