use serde_json::Value;

use crate::{error::CacheError, identity::RecordId, key::FieldKey};

/// The value held by one field slot of a record.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldValue {
    /// Any leaf value, including lists of scalars and custom JSON scalars.
    Scalar(Value),
    Link(Option<RecordId>),
    LinkList(Vec<Option<RecordId>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ValueShape {
    Scalar,
    Link,
    #[strum(serialize = "link list")]
    LinkList,
}

impl FieldValue {
    pub fn null() -> Self {
        FieldValue::Scalar(Value::Null)
    }

    pub fn shape(&self) -> ValueShape {
        match self {
            FieldValue::Scalar(_) => ValueShape::Scalar,
            FieldValue::Link(_) => ValueShape::Link,
            FieldValue::LinkList(_) => ValueShape::LinkList,
        }
    }

    /// An explicit null, which may replace (or be replaced by) a value of any shape.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Scalar(Value::Null))
    }

    pub fn as_link_list(&self) -> Option<&[Option<RecordId>]> {
        match self {
            FieldValue::LinkList(ids) => Some(ids),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<Option<&RecordId>> {
        match self {
            FieldValue::Link(id) => Some(id.as_ref()),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            FieldValue::Scalar(value) => Some(value),
            _ => None,
        }
    }
}

pub(crate) fn check_shape(
    record: &RecordId,
    key: &FieldKey,
    existing: Option<&FieldValue>,
    incoming: &FieldValue,
) -> Result<(), CacheError> {
    let Some(existing) = existing else {
        return Ok(());
    };

    if existing.is_null() || incoming.is_null() || existing.shape() == incoming.shape() {
        return Ok(());
    }

    Err(CacheError::ShapeMismatch {
        record: record.clone(),
        key: key.clone(),
        existing: existing.shape(),
        incoming: incoming.shape(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn shape_changes_are_rejected() {
        let record = RecordId::from("User:1");
        let key = FieldKey::new("friends");
        let existing = FieldValue::LinkList(vec![]);

        let error = check_shape(&record, &key, Some(&existing), &FieldValue::Link(None)).unwrap_err();

        assert_eq!(
            error.to_string(),
            "field friends of record User:1 holds a link list and cannot be overwritten with a link"
        );
    }

    #[test]
    fn nulls_are_shapeless() {
        let record = RecordId::from("User:1");
        let key = FieldKey::new("friends");

        assert!(check_shape(&record, &key, Some(&FieldValue::null()), &FieldValue::LinkList(vec![])).is_ok());
        assert!(check_shape(&record, &key, Some(&FieldValue::Link(None)), &FieldValue::null()).is_ok());
        assert!(check_shape(&record, &key, None, &FieldValue::Scalar(json!(1))).is_ok());
    }

    #[test]
    fn serialized_form() {
        let values = vec![
            FieldValue::Scalar(json!({"nested": true})),
            FieldValue::Link(Some(RecordId::from("User:1"))),
            FieldValue::Link(None),
            FieldValue::LinkList(vec![Some(RecordId::from("User:2")), None]),
        ];

        insta::assert_json_snapshot!(values, @r###"
        [
          {
            "scalar": {
              "nested": true
            }
          },
          {
            "link": "User:1"
          },
          {
            "link": null
          },
          {
            "linkList": [
              "User:2",
              null
            ]
          }
        ]
        "###);
    }
}
