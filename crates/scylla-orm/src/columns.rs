use scylla::frame::response::result::{CqlValue, Row};
use std::collections::{hash_map::Iter, HashMap};

use crate::value::{FromCqlVal, ToCqlVal};

#[derive(Debug, Default, PartialEq)]
pub struct ColumnsMap(HashMap<String, CqlValue>);

impl ColumnsMap {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(HashMap::with_capacity(capacity))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.keys().map(|k| k.to_owned()).collect()
    }

    pub fn get(&self, key: &str) -> Option<&CqlValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> Iter<'_, String, CqlValue> {
        self.0.iter()
    }

    pub fn get_as<T: FromCqlVal>(&self, key: &str) -> anyhow::Result<T> {
        match self.0.get(key) {
            Some(v) => T::from_cql(v).map_err(anyhow::Error::new),
            None => Err(anyhow::Error::msg(format!(
                "ColumnsMap::get_as: value for {:?} is null",
                key
            ))),
        }
    }

    pub fn set_as<T: ToCqlVal>(&mut self, key: &str, val: &T) {
        self.0.insert(key.to_string(), val.to_cql());
    }

    pub fn fill(&mut self, row: Row, fields: &Vec<String>) -> anyhow::Result<()> {
        if row.columns.len() != fields.len() {
            return Err(anyhow::Error::msg(format!(
                "ColumnsMap::fill: row.columns.len({}) != fields.len({})",
                row.columns.len(),
                fields.len()
            )));
        }
        for (i, val) in row.columns.iter().enumerate() {
            if let Some(v) = val {
                self.0.insert(fields[i].to_owned(), v.to_owned());
            }
        }
        Ok(())
    }
}
