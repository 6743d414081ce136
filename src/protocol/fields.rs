//! Decoded packet content handed to subscribers.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::layout::Scalar;

/// One semantic value inside a [`FieldMapping`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    UInt(u64),
    Int(i64),
    Bool(bool),
    Text(String),
    /// Calendar date converted from a game date
    Date(NaiveDate),
    /// Undecoded payload of an unregistered packet
    Bytes(Vec<u8>),
    List(Vec<FieldValue>),
    Map(FieldMapping),
    /// Integer-keyed table (protocol settings)
    Keyed(BTreeMap<u64, FieldValue>),
}

impl FieldValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            Self::Bool(b) => Some(u64::from(*b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&FieldMapping> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<Scalar> for FieldValue {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Unsigned(v) => Self::UInt(v),
            Scalar::Signed(v) => Self::Int(v),
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl From<FieldMapping> for FieldValue {
    fn from(m: FieldMapping) -> Self {
        Self::Map(m)
    }
}

/// Field name → value. Owns its data; nothing points back into the frame bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping {
    fields: BTreeMap<&'static str, FieldValue>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: &'static str, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &'static str, value: impl Into<FieldValue>) {
        self.fields.insert(name, value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(FieldValue::as_u64)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }
}
