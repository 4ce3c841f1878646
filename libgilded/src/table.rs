use indexmap::IndexMap;
use std::fmt;

/// Key of a table entry. Lua tables mix positional (integer) and named
/// (string) keys inside the same container.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKey {
    Int(i64),
    Str(String),
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKey::Int(i) => write!(f, "[{}]", i),
            TableKey::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for TableKey {
    fn from(s: &str) -> Self {
        TableKey::Str(s.to_string())
    }
}

impl From<i64> for TableKey {
    fn from(i: i64) -> Self {
        TableKey::Int(i)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    /// Integral value, if the number has no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Number::Int(i) => Some(i),
            Number::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(f as i64),
            Number::Float(_) => None,
        }
    }
}

/// Parsed table tree.
///
/// A table whose keys are exactly `1..=n` in ascending order becomes a
/// [`TableValue::Sequence`], every other table (including `{}`) a
/// [`TableValue::Map`] that keeps source order.
#[derive(Clone, Debug, PartialEq)]
pub enum TableValue {
    Map(IndexMap<TableKey, TableValue>),
    Sequence(Vec<TableValue>),
    String(String),
    Number(Number),
    Boolean(bool),
    Nil,
}

impl TableValue {
    pub(crate) fn from_entries(entries: IndexMap<TableKey, TableValue>) -> TableValue {
        let contiguous = !entries.is_empty()
            && entries
                .keys()
                .enumerate()
                .all(|(idx, key)| *key == TableKey::Int(idx as i64 + 1));

        if contiguous {
            TableValue::Sequence(entries.into_values().collect())
        } else {
            TableValue::Map(entries)
        }
    }

    pub fn get<K: Into<TableKey>>(&self, key: K) -> Option<&TableValue> {
        match (self, key.into()) {
            (TableValue::Map(map), key) => map.get(&key),
            (TableValue::Sequence(seq), TableKey::Int(idx)) if idx >= 1 => {
                seq.get(idx as usize - 1)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TableValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TableValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TableValue::Number(n) => Some(n.as_f64()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TableValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, TableValue::Nil)
    }

    /// Iterate entries regardless of container kind; sequences yield their
    /// 1-based positions as keys.
    pub fn entries(&self) -> Box<dyn Iterator<Item = (TableKey, &TableValue)> + '_> {
        match self {
            TableValue::Map(map) => Box::new(map.iter().map(|(k, v)| (k.clone(), v))),
            TableValue::Sequence(seq) => Box::new(
                seq.iter()
                    .enumerate()
                    .map(|(idx, v)| (TableKey::Int(idx as i64 + 1), v)),
            ),
            _ => Box::new(std::iter::empty()),
        }
    }

    /// Values of a table in source order.
    pub fn values(&self) -> Box<dyn Iterator<Item = &TableValue> + '_> {
        Box::new(self.entries().map(|(_, v)| v))
    }

    /// Move the children of a container into `into`, leaving it empty.
    fn take_children(&mut self, into: &mut Vec<TableValue>) {
        match self {
            TableValue::Map(map) => into.extend(std::mem::take(map).into_values()),
            TableValue::Sequence(seq) => into.append(seq),
            _ => {}
        }
    }

    /// String-keyed entries of a map whose value is a string.
    pub fn string_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        let map = match self {
            TableValue::Map(map) => Some(map),
            _ => None,
        };
        map.into_iter().flat_map(|map| {
            map.iter().filter_map(|(k, v)| match (k, v) {
                (TableKey::Str(k), TableValue::String(v)) => Some((k.as_str(), v.as_str())),
                _ => None,
            })
        })
    }
}

// Nesting depth is bounded only by the input size, so children are freed
// from an explicit stack rather than by recursive drop glue.
impl Drop for TableValue {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.take_children(&mut pending);
        while let Some(mut value) = pending.pop() {
            value.take_children(&mut pending);
        }
    }
}
