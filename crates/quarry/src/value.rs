use serde::Serialize;
use std::{cmp::Ordering, fmt};

///
/// Value
///
/// Value is the group-key substrate: the result of evaluating a group-by
/// expression for one group, and the scalar payload of rendered aggregates.
/// It carries a total order so result groups can be merged and deduplicated
/// by value across passes and shards.
///

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    Text(String),
    Raw(Vec<u8>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Long(_) => 2,
            Self::Double(_) => 3,
            Self::Text(_) => 4,
            Self::Raw(_) => 5,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Long(a), Self::Long(b)) => a.cmp(b),
            // total_cmp keeps NaN orderable so merge keys stay deterministic
            (Self::Double(a), Self::Double(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Raw(a), Self::Raw(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Raw(bytes) => {
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::Value;
    use std::cmp::Ordering;

    #[test]
    fn value_order_is_total_across_variants() {
        let sorted = [
            Value::Null,
            Value::Bool(false),
            Value::Long(-3),
            Value::Double(0.5),
            Value::Text("a".to_string()),
            Value::Raw(vec![1]),
        ];
        for window in sorted.windows(2) {
            assert_eq!(window[0].cmp(&window[1]), Ordering::Less);
        }
    }

    #[test]
    fn nan_keys_compare_equal_to_themselves() {
        let nan = Value::Double(f64::NAN);
        assert_eq!(nan, nan.clone());
    }

    #[test]
    fn raw_values_display_as_hex() {
        assert_eq!(Value::Raw(vec![0x0a, 0xff]).to_string(), "0aff");
    }
}
