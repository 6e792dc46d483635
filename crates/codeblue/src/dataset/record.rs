use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single cell of a source row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
  Number(f64),
  Text(String),
}

impl FieldValue {
  pub fn as_number(&self) -> Option<f64> {
    match self {
      FieldValue::Number(n) => Some(*n),
      FieldValue::Text(_) => None,
    }
  }

  fn from_json(value: serde_json::Value) -> Option<Self> {
    match value {
      serde_json::Value::Null => None,
      serde_json::Value::Number(n) => n.as_f64().map(FieldValue::Number),
      serde_json::Value::String(s) => Some(FieldValue::Text(s)),
      other => Some(FieldValue::Text(other.to_string())),
    }
  }
}

impl fmt::Display for FieldValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FieldValue::Number(n) => write!(f, "{}", format_number(*n)),
      FieldValue::Text(s) => write!(f, "{s:?}"),
    }
  }
}

/// Render whole numbers without a trailing fraction
pub fn format_number(n: f64) -> String {
  if n.fract() == 0.0 && n.abs() < 1e15 {
    format!("{}", n as i64)
  } else {
    format!("{n}")
  }
}

/// One row of a source dataset, fields kept in file column order.
/// Missing cells are not stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
  fields: Vec<(String, FieldValue)>,
}

impl Record {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert a field, replacing any earlier value under the same name
  pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
    let name = name.into();
    match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
      Some((_, slot)) => *slot = value,
      None => self.fields.push((name, value)),
    }
  }

  pub fn with(mut self, name: impl Into<String>, value: FieldValue) -> Self {
    self.insert(name, value);
    self
  }

  pub fn get(&self, name: &str) -> Option<&FieldValue> {
    self.fields.iter().find(|(existing, _)| existing == name).map(|(_, value)| value)
  }

  pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
    self.fields.iter().map(|(name, value)| (name.as_str(), value))
  }

  pub fn len(&self) -> usize {
    self.fields.len()
  }

  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }
}

impl fmt::Display for Record {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{{")?;
    for (i, (name, value)) in self.fields.iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{name:?}: {value}")?;
    }
    write!(f, "}}")
  }
}

impl Serialize for Record {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.fields.len()))?;
    for (name, value) in &self.fields {
      map.serialize_entry(name, value)?;
    }
    map.end()
  }
}

impl<'de> Deserialize<'de> for Record {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct RecordVisitor;

    impl<'de> Visitor<'de> for RecordVisitor {
      type Value = Record;

      fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of field names to scalar values")
      }

      fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Record, A::Error> {
        let mut record = Record::new();
        while let Some((name, value)) = access.next_entry::<String, serde_json::Value>()? {
          if let Some(value) = FieldValue::from_json(value) {
            record.insert(name, value);
          }
        }
        Ok(record)
      }
    }

    deserializer.deserialize_map(RecordVisitor)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn stay() -> Record {
    Record::new()
      .with("subject_id", FieldValue::Number(10001.0))
      .with("first_careunit", FieldValue::Text("MICU".to_string()))
      .with("los", FieldValue::Number(2.5))
  }

  #[test]
  fn test_display_keeps_column_order() {
    assert_eq!(
      stay().to_string(),
      r#"{"subject_id": 10001, "first_careunit": "MICU", "los": 2.5}"#
    );
  }

  #[test]
  fn test_serializes_as_flat_metadata_object() {
    let json = serde_json::to_value(stay()).unwrap();
    assert_eq!(
      json,
      serde_json::json!({"subject_id": 10001.0, "first_careunit": "MICU", "los": 2.5})
    );
  }

  #[test]
  fn test_metadata_nulls_are_dropped() {
    let record: Record =
      serde_json::from_str(r#"{"pid": 1, "note": null, "flag": true}"#).unwrap();

    assert_eq!(record.len(), 2);
    assert_eq!(record.get("pid"), Some(&FieldValue::Number(1.0)));
    assert_eq!(record.get("flag"), Some(&FieldValue::Text("true".to_string())));
  }

  #[test]
  fn test_insert_replaces_existing_field() {
    let mut record = stay();
    record.insert("los", FieldValue::Number(3.0));

    assert_eq!(record.len(), 3);
    assert_eq!(record.get("los").and_then(FieldValue::as_number), Some(3.0));
  }
}
