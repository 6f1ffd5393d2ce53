use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Identifier as written in configuration: an integer code or a free-form string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    Code(i64),
    Text(String),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Code(code) => write!(f, "{}", code),
            Identifier::Text(text) => f.write_str(text),
        }
    }
}

/// Set of identifiers selecting which records to keep.
///
/// Membership is decided on the canonical text form, so the integer `2309458`
/// and the string `"2309458"` are the same identifier. Order and duplicates in
/// the source list do not matter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    keys: HashSet<String>,
}

impl AllowList {
    pub fn new<I, T>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Identifier>,
    {
        Self {
            keys: identifiers
                .into_iter()
                .map(|id| canonical(&id.into().to_string()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Null, boolean and nested values never match.
    pub fn contains(&self, value: &Value) -> bool {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => self.keys.contains(&i.to_string()),
                None => self.keys.contains(&n.to_string()),
            },
            Value::String(s) => self.keys.contains(&canonical(s)),
            _ => false,
        }
    }
}

fn canonical(text: &str) -> String {
    text.trim().to_string()
}

impl From<i64> for Identifier {
    fn from(code: i64) -> Self {
        Identifier::Code(code)
    }
}

impl From<&str> for Identifier {
    fn from(text: &str) -> Self {
        Identifier::Text(text.to_string())
    }
}

impl From<String> for Identifier {
    fn from(text: String) -> Self {
        Identifier::Text(text)
    }
}

impl From<&Identifier> for Identifier {
    fn from(id: &Identifier) -> Self {
        id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_membership_ignores_order_and_duplicates() {
        let forward = AllowList::new([2309458_i64, 2301950, 2310100, 2310100]);
        let reversed = AllowList::new([2310100_i64, 2301950, 2309458]);

        assert_eq!(forward, reversed);
        assert_eq!(forward.len(), 3);
        for code in [2309458, 2301950, 2310100] {
            assert!(forward.contains(&json!(code)));
        }
        assert!(!forward.contains(&json!(2906501)));
    }

    #[test]
    fn test_integer_and_string_forms_match() {
        let list = AllowList::new([Identifier::Code(2906501), Identifier::from("2916104")]);
        assert!(list.contains(&json!("2906501")));
        assert!(list.contains(&json!(2916104)));
        assert!(list.contains(&json!(" 2916104 ")));
    }

    #[test]
    fn test_null_and_non_scalar_never_match() {
        let list = AllowList::new(["null", "true"]);
        assert!(!list.contains(&json!(null)));
        assert!(!list.contains(&json!(true)));
        assert!(!list.contains(&json!(["null"])));
    }

    #[test]
    fn test_identifier_deserializes_untagged() {
        let ids: Vec<Identifier> = serde_json::from_value(json!([2309458, "CE"])).unwrap();
        assert_eq!(ids, vec![Identifier::Code(2309458), Identifier::Text("CE".into())]);
    }
}
