//! Secondary index definitions shared by modules, settings, and the db layer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction of a single index key, encoded the way MongoDB expects (`1` / `-1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_i32(self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

impl TryFrom<i32> for SortOrder {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SortOrder::Ascending),
            -1 => Ok(SortOrder::Descending),
            other => Err(format!("index order must be 1 or -1, got {other}")),
        }
    }
}

impl From<SortOrder> for i32 {
    fn from(order: SortOrder) -> Self {
        order.as_i32()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl IndexKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Descending,
        }
    }
}

/// Desired secondary index on a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Explicit index name; MongoDB's generated name is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub keys: Vec<IndexKey>,
    #[serde(default)]
    pub unique: bool,
    /// Index becomes redundant once the indexed field is stored as `_id`
    #[serde(default)]
    pub superseded_by_id: bool,
}

impl IndexSpec {
    /// Ascending index on one field.
    pub fn single(field: impl Into<String>) -> Self {
        Self::compound(vec![IndexKey::asc(field)])
    }

    pub fn compound(keys: Vec<IndexKey>) -> Self {
        Self {
            name: None,
            keys,
            unique: false,
            superseded_by_id: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn superseded_by_id(mut self) -> Self {
        self.superseded_by_id = true;
        self
    }

    /// Name the index is stored under: the explicit name, or the server default
    /// of `field_order` pairs joined with `_` (e.g. `type_1_status_1`).
    pub fn resolved_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        default_index_name(&self.keys)
    }

    /// Two specs describe the same server-side index when keys (in order) and
    /// uniqueness agree. Names are not compared.
    pub fn same_definition(&self, keys: &[IndexKey], unique: bool) -> bool {
        self.keys == keys && self.unique == unique
    }
}

pub fn default_index_name(keys: &[IndexKey]) -> String {
    keys.iter()
        .map(|key| format!("{}_{}", key.field, key.order.as_i32()))
        .collect::<Vec<_>>()
        .join("_")
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self
            .keys
            .iter()
            .map(|key| format!("{}: {}", key.field, key.order.as_i32()))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{} {{ {} }}", self.resolved_name(), keys)?;
        if self.unique {
            write!(f, " unique")?;
        }
        Ok(())
    }
}
