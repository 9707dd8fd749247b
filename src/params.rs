//! Named, nested configuration dictionaries
//!
//! A [`ParameterList`] is a JSON object with a name. Values are read back with
//! serde, so any deserializable type can be stored: scalars, vectors, bounds.
//! Nested objects are sublists, named after their key.

use crate::bounds::Bounds;
use crate::errors::{Result, StatsError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Display;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterList {
    name: String,
    values: Map<String, Value>,
}

impl ParameterList {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            values: Map::new(),
        }
    }

    /// Wrap a JSON value, which must be an object
    pub fn from_value(name: &str, value: Value) -> Result<Self> {
        match value {
            Value::Object(values) => Ok(Self {
                name: name.to_string(),
                values,
            }),
            other => Err(StatsError::InvalidParameter {
                list: name.to_string(),
                param: name.to_string(),
                message: format!("expected an object, found {other}"),
            }),
        }
    }

    pub fn from_json_str(name: &str, json: &str) -> Result<Self> {
        Self::from_value(name, serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&name, &text)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_parameter(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(|v| !v.is_object())
    }

    #[must_use]
    pub fn is_sublist(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(Value::is_object)
    }

    /// Typed lookup of a required parameter
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| StatsError::MissingParameter {
                list: self.name.clone(),
                param: key.to_string(),
            })?;
        T::deserialize(value).map_err(|e| StatsError::InvalidParameter {
            list: self.name.clone(),
            param: key.to_string(),
            message: e.to_string(),
        })
    }

    /// Typed lookup with a fallback when the key is absent
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        if self.values.contains_key(key) {
            self.get(key)
        } else {
            Ok(default)
        }
    }

    /// Optional typed lookup
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if self.values.contains_key(key) {
            self.get(key).map(Some)
        } else {
            Ok(None)
        }
    }

    /// `[min, max]` window stored as a two-entry list
    pub fn get_bounds<T>(&self, key: &str) -> Result<Bounds<T>>
    where
        T: DeserializeOwned + PartialOrd + Copy + Display,
    {
        let values: Vec<T> = self.get(key)?;
        Bounds::from_slice(&values).map_err(|e| StatsError::InvalidParameter {
            list: self.name.clone(),
            param: key.to_string(),
            message: e.to_string(),
        })
    }

    pub fn get_bounds_opt<T>(&self, key: &str) -> Result<Option<Bounds<T>>>
    where
        T: DeserializeOwned + PartialOrd + Copy + Display,
    {
        if self.values.contains_key(key) {
            self.get_bounds(key).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        self.values.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Builder form of [`ParameterList::set`]
    pub fn with<T: Serialize>(mut self, key: &str, value: T) -> Result<Self> {
        self.set(key, value)?;
        Ok(self)
    }

    pub fn sublist(&self, key: &str) -> Result<ParameterList> {
        match self.values.get(key) {
            Some(Value::Object(values)) => Ok(ParameterList {
                name: key.to_string(),
                values: values.clone(),
            }),
            Some(_) => Err(StatsError::InvalidParameter {
                list: self.name.clone(),
                param: key.to_string(),
                message: "expected a sublist".to_string(),
            }),
            None => Err(StatsError::MissingParameter {
                list: self.name.clone(),
                param: key.to_string(),
            }),
        }
    }

    /// Sublist if present, an empty list with that name otherwise
    pub fn sublist_or_empty(&self, key: &str) -> Result<ParameterList> {
        if self.values.contains_key(key) {
            self.sublist(key)
        } else {
            Ok(ParameterList::new(key))
        }
    }

    pub fn set_sublist(&mut self, key: &str, list: ParameterList) {
        self.values.insert(key.to_string(), Value::Object(list.values));
    }

    /// Builder form of [`ParameterList::set_sublist`]
    #[must_use]
    pub fn with_sublist(mut self, key: &str, list: ParameterList) -> Self {
        self.set_sublist(key, list);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}
