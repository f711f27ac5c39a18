// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::iter;
use std::ops::Deref;
use std::sync::Arc;

use crate::value::Value;

/// A record is a collection of key-value pairs that represent a single row of
/// a statement result.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entries: Vec<(Arc<String>, Option<Value>)>,
}

impl Record {
    pub(crate) fn new(keys: &[Arc<String>], values: Vec<Value>) -> Self {
        assert_eq!(keys.len(), values.len());
        Self {
            entries: iter::zip(keys.iter().map(Arc::clone), values.into_iter().map(Some)).collect(),
        }
    }

    /// Iterate over the keys of the record.
    /// The order of the keys corresponds to the order of the values.
    pub fn keys(&self) -> impl Iterator<Item = Arc<String>> + '_ {
        self.entries
            .iter()
            .filter_map(|(key, value)| value.as_ref().map(|_| Arc::clone(key)))
    }

    /// Iterate over the values of the record.
    /// The order of the values corresponds to the order of the keys.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries
            .iter()
            .map(|(_, value)| value)
            .filter_map(Option::as_ref)
    }

    /// Iterate over the values of the record.
    ///
    /// This is the same as [`Record::values()`], but consumes the record and
    /// returns owned values.
    pub fn into_values(self) -> impl Iterator<Item = Value> {
        self.entries.into_iter().filter_map(|(_, value)| value)
    }

    /// Get the value for the given key or [`None`] if the key does not exist.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k, v)))
            .find_map(|(k, v)| if k.deref() == key { Some(v) } else { None })
    }

    /// Get the value at the given position or [`None`] if the index is out of
    /// bounds (or the value has been taken).
    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.entries.get(index).and_then(|(_, v)| v.as_ref())
    }

    /// Get the value for the given key or [`None`] if the key does not exist.
    ///
    /// This is the same as [`Record::value()`],
    /// but it removes the entry and returns an owned value.
    pub fn take_value(&mut self, key: &str) -> Option<Value> {
        self.entries
            .iter_mut()
            .filter(|(k, _)| k.deref() == key)
            .find_map(|(_, v)| v.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, i64)]) -> Record {
        let keys = pairs
            .iter()
            .map(|(k, _)| Arc::new(String::from(*k)))
            .collect::<Vec<_>>();
        let values = pairs.iter().map(|(_, v)| Value::Integer(*v)).collect();
        Record::new(&keys, values)
    }

    #[test]
    fn access_by_key_and_index() {
        let record = record(&[("one", 1), ("two", 2)]);
        assert_eq!(record.value("one"), Some(&Value::Integer(1)));
        assert_eq!(record.value("three"), None);
        assert_eq!(record.value_at(1), Some(&Value::Integer(2)));
        assert_eq!(record.value_at(2), None);
    }

    #[test]
    fn take_value_removes_the_entry() {
        let mut record = record(&[("one", 1), ("two", 2)]);
        assert_eq!(record.take_value("one"), Some(Value::Integer(1)));
        assert_eq!(record.take_value("one"), None);
        assert_eq!(
            record.keys().collect::<Vec<_>>(),
            vec![Arc::new(String::from("two"))]
        );
    }
}
