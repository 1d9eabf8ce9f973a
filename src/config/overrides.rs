//! Dotted-path overrides applied to a raw document before typed parsing.
//!
//! `trainer.learning_rate=3e-4` replaces one value, `trainer.wandb.tags=[a, b]`
//! replaces a list. Missing intermediate sections are created.

use serde_yaml::{Mapping, Value};

use crate::{ConfigError, Result};

/// Apply `key.path=value` overrides to a document in order
pub fn apply_overrides<S: AsRef<str>>(doc: &mut Value, overrides: &[S]) -> Result<()> {
    for raw in overrides {
        let raw = raw.as_ref();
        let (path, value) = parse_override(raw)?;
        tracing::debug!("Applying override {} = {:?}", path, value);
        set_path(doc, &path, value)?;
    }
    Ok(())
}

fn parse_override(raw: &str) -> Result<(String, Value)> {
    let (path, value) = raw
        .split_once('=')
        .ok_or_else(|| ConfigError::Override(format!("'{}' is missing '='", raw)))?;

    let path = path.trim();
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(ConfigError::Override(format!("'{}' has an empty key", raw)));
    }

    let value: Value = serde_yaml::from_str(value.trim())
        .map_err(|e| ConfigError::Override(format!("'{}': {}", raw, e)))?;
    Ok((path.to_string(), value))
}

fn set_path(doc: &mut Value, path: &str, value: Value) -> Result<()> {
    let keys: Vec<&str> = path.split('.').collect();
    let (last, parents) = keys
        .split_last()
        .ok_or_else(|| ConfigError::Override("empty path".to_string()))?;

    let mut node = doc;
    for (depth, key) in parents.iter().enumerate() {
        let map = as_mapping(node, &keys[..depth])?;
        if !map.contains_key(*key) {
            map.insert(Value::from(*key), Value::Mapping(Mapping::new()));
        }
        node = map
            .get_mut(*key)
            .ok_or_else(|| ConfigError::Override(format!("cannot descend into '{}'", key)))?;
    }

    as_mapping(node, parents)?.insert(Value::from(*last), value);
    Ok(())
}

fn as_mapping<'a>(node: &'a mut Value, at: &[&str]) -> Result<&'a mut Mapping> {
    if node.is_null() {
        *node = Value::Mapping(Mapping::new());
    }
    node.as_mapping_mut().ok_or_else(|| {
        ConfigError::Override(format!("'{}' is not a section", at.join(".")))
    })
}
