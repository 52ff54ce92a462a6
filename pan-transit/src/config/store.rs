//! Nested, type-checked option store.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::geo::Units;
use crate::persist::{self, PersistError};

use super::coerce::coerce;

/// Top-level section holding provider-specific options.
pub const PROVIDERS: &str = "providers";

const DEPARTURE_TIME_CUTOFF: &str = "departure_time_cutoff";
const FAVORITE_HIGHLIGHT_RADIUS: &str = "favorite_highlight_radius";
const PROVIDER: &str = "provider";
const UNITS: &str = "units";
const VERSION: &str = "version";

/// Built-in options and their defaults. Leaf types of this table are the
/// types every loaded or assigned value is coerced to.
fn builtin_defaults() -> Map<String, Value> {
    let mut defaults = Map::new();
    defaults.insert(DEPARTURE_TIME_CUTOFF.into(), Value::from(10));
    defaults.insert(FAVORITE_HIGHLIGHT_RADIUS.into(), Value::from(1000));
    defaults.insert(PROVIDER.into(), Value::from("digitransit_hsl"));
    defaults.insert(UNITS.into(), Value::from("metric"));
    defaults.insert(PROVIDERS.into(), Value::Object(Map::new()));
    defaults
}

/// Option values plus the defaults that type them.
///
/// Options are addressed by path segments, e.g. `&["providers", "tfl", "app_key"]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationStore {
    values: Map<String, Value>,
    defaults: Map<String, Value>,
}

impl Default for ConfigurationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationStore {
    /// Create a store holding the built-in defaults.
    pub fn new() -> Self {
        let defaults = builtin_defaults();
        Self {
            values: defaults.clone(),
            defaults,
        }
    }

    /// Value of the option at `path`.
    pub fn get(&self, path: &[&str]) -> Option<Value> {
        lookup(&self.values, path).cloned()
    }

    /// Default value of the option at `path`.
    pub fn get_default(&self, path: &[&str]) -> Option<Value> {
        lookup(&self.defaults, path).cloned()
    }

    /// Set the option at `path`, creating missing sections.
    ///
    /// The value is coerced to the type of the option's default. If there is
    /// no default or the coercion fails, the value is stored as given.
    pub fn set(&mut self, path: &[&str], value: impl Into<Value>) {
        let value = value.into();
        let value = match self.get_default(path).map(|default| coerce(&value, &default)) {
            Some(Ok(coerced)) => coerced,
            Some(Err(e)) => {
                debug!(option = %path.join("."), error = %e, "Storing option without coercion");
                value
            }
            None => value,
        };
        let Some((name, sections)) = path.split_last() else {
            return;
        };
        if let Some(section) = section_mut(&mut self.values, sections) {
            section.insert((*name).to_string(), value);
        }
    }

    /// Add `item` to the list option at `path` unless already present.
    pub fn add(&mut self, path: &[&str], item: impl Into<Value>) {
        let item = item.into();
        let Some(list) = self.list_mut(path) else {
            warn!(option = %path.join("."), "Cannot add to an option that is not a list");
            return;
        };
        if !list.contains(&item) {
            list.push(item);
        }
    }

    /// Remove `item` from the list option at `path` if present.
    pub fn remove(&mut self, path: &[&str], item: impl Into<Value>) {
        let item = item.into();
        let Some((name, sections)) = path.split_last() else {
            return;
        };
        let list = lookup_section_mut(&mut self.values, sections)
            .and_then(|section| section.get_mut(*name))
            .and_then(Value::as_array_mut);
        if let Some(list) = list
            && let Some(pos) = list.iter().position(|x| *x == item)
        {
            list.remove(pos);
        }
    }

    /// Whether the list option at `path` contains `item`.
    pub fn contains(&self, path: &[&str], item: impl Into<Value>) -> bool {
        let item = item.into();
        lookup(&self.values, path)
            .and_then(Value::as_array)
            .is_some_and(|list| list.contains(&item))
    }

    /// Register default options for provider `id` under `providers.<id>`.
    ///
    /// Only the first registration for an id has any effect. Values already
    /// present for the provider (e.g. loaded from disk) are kept if they fit
    /// the new defaults.
    pub fn register_provider(&mut self, id: &str, defaults: Map<String, Value>) {
        let provider_defaults = self
            .defaults
            .entry(PROVIDERS)
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(provider_defaults) = provider_defaults.as_object_mut() else {
            return;
        };
        if provider_defaults.contains_key(id) {
            return;
        }
        provider_defaults.insert(id.to_string(), Value::Object(defaults.clone()));

        let existing = lookup(&self.values, &[PROVIDERS, id])
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let mut merged = defaults.clone();
        let mut path = vec![PROVIDERS.to_string(), id.to_string()];
        overlay(&mut merged, existing, Some(&defaults), &mut path);
        if let Some(providers) = section_mut(&mut self.values, &[PROVIDERS]) {
            providers.insert(id.to_string(), Value::Object(merged));
        }
        debug!(provider = %id, "Registered provider options");
    }

    /// Load option values from the JSON file at `path`.
    ///
    /// Every value is checked against its default; bad values are discarded
    /// one by one with a warning and the rest still load. A missing file
    /// leaves the store unchanged.
    pub fn read(&mut self, path: &Path) -> Result<(), PersistError> {
        let mut values: Map<String, Value> = match persist::read_json(path) {
            Ok(values) => values,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        values.remove(VERSION);
        overlay(&mut self.values, values, Some(&self.defaults), &mut Vec::new());
        Ok(())
    }

    /// Write option values to the JSON file at `path`.
    ///
    /// Top-level options without a built-in default are dropped and the crate
    /// version is stamped into the file.
    pub fn write(&self, path: &Path) -> Result<(), PersistError> {
        let mut out: Map<String, Value> = self
            .values
            .iter()
            .filter(|(name, _)| self.defaults.contains_key(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        out.insert(VERSION.into(), Value::from(env!("CARGO_PKG_VERSION")));
        persist::write_json(&out, path)
    }

    /// Id of the configured provider.
    pub fn provider(&self) -> String {
        self.string_option(PROVIDER)
    }

    /// Make `id` the configured provider.
    pub fn set_provider(&mut self, id: &str) {
        self.set(&[PROVIDER], id);
    }

    /// Id of the built-in default provider.
    pub fn default_provider(&self) -> String {
        lookup(&self.defaults, &[PROVIDER])
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Unit system for distances.
    pub fn units(&self) -> Units {
        Units::from_name(&self.string_option(UNITS))
    }

    /// Minutes below which departure times are shown as "N min".
    pub fn departure_time_cutoff(&self) -> i64 {
        self.int_option(DEPARTURE_TIME_CUTOFF)
    }

    /// Radius in meters within which favorites are highlighted as nearby.
    pub fn favorite_highlight_radius(&self) -> i64 {
        self.int_option(FAVORITE_HIGHLIGHT_RADIUS)
    }

    /// Provider-specific option `providers.<id>.<name>`.
    pub fn provider_option(&self, id: &str, name: &str) -> Option<Value> {
        self.get(&[PROVIDERS, id, name])
    }

    fn string_option(&self, name: &str) -> String {
        lookup(&self.values, &[name])
            .or_else(|| lookup(&self.defaults, &[name]))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn int_option(&self, name: &str) -> i64 {
        lookup(&self.values, &[name])
            .and_then(Value::as_i64)
            .or_else(|| lookup(&self.defaults, &[name]).and_then(Value::as_i64))
            .unwrap_or_default()
    }

    fn list_mut(&mut self, path: &[&str]) -> Option<&mut Vec<Value>> {
        let (name, sections) = path.split_last()?;
        section_mut(&mut self.values, sections)?
            .entry(*name)
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
    }
}

/// Value at `path` in a nested map.
fn lookup<'a>(root: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (name, sections) = path.split_last()?;
    let mut node = root;
    for section in sections {
        node = node.get(*section)?.as_object()?;
    }
    node.get(*name)
}

/// Existing section at `sections`, without creating anything.
fn lookup_section_mut<'a>(
    root: &'a mut Map<String, Value>,
    sections: &[&str],
) -> Option<&'a mut Map<String, Value>> {
    let mut node = root;
    for section in sections {
        node = node.get_mut(*section)?.as_object_mut()?;
    }
    Some(node)
}

/// Section at `sections`, creating (or replacing non-mapping values with)
/// empty sections along the way.
fn section_mut<'a>(
    root: &'a mut Map<String, Value>,
    sections: &[&str],
) -> Option<&'a mut Map<String, Value>> {
    let mut node = root;
    for section in sections {
        let slot = node
            .entry(*section)
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        node = slot.as_object_mut()?;
    }
    Some(node)
}

/// Overlay `values` onto `root`, validating leaves against `defaults`.
///
/// `path` is the location of `root` in the whole tree and only used for
/// diagnostics.
fn overlay(
    root: &mut Map<String, Value>,
    values: Map<String, Value>,
    defaults: Option<&Map<String, Value>>,
    path: &mut Vec<String>,
) {
    for (name, value) in values {
        let default = defaults.and_then(|d| d.get(&name));
        path.push(name.clone());
        match value {
            Value::Object(nested) => {
                if default.is_some_and(|d| !d.is_object()) {
                    warn!(
                        option = %path.join("."),
                        "Discarding section where a value was expected"
                    );
                } else if let Some(section) = section_mut(root, &[name.as_str()]) {
                    overlay(section, nested, default.and_then(Value::as_object), path);
                }
            }
            value => match default {
                Some(default) => match coerce(&value, default) {
                    Ok(coerced) => {
                        root.insert(name, coerced);
                    }
                    Err(e) => {
                        warn!(
                            option = %path.join("."),
                            value = %value,
                            error = %e,
                            "Discarding bad option-value pair"
                        );
                    }
                },
                None => {
                    root.insert(name, value);
                }
            },
        }
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn defaults() {
        let conf = ConfigurationStore::new();
        assert_eq!(conf.get(&["units"]), Some(json!("metric")));
        assert_eq!(conf.get_default(&["units"]), Some(json!("metric")));
        assert_eq!(conf.provider(), "digitransit_hsl");
        assert_eq!(conf.units(), Units::Metric);
        assert_eq!(conf.departure_time_cutoff(), 10);
        assert_eq!(conf.favorite_highlight_radius(), 1000);
    }

    #[test]
    fn set_coerces_to_default_type() {
        let mut conf = ConfigurationStore::new();
        conf.set(&["departure_time_cutoff"], 10.1);
        assert_eq!(conf.get(&["departure_time_cutoff"]), Some(json!(10)));
        assert_eq!(conf.departure_time_cutoff(), 10);
    }

    #[test]
    fn set_stores_raw_value_when_coercion_fails() {
        let mut conf = ConfigurationStore::new();
        conf.set(&["departure_time_cutoff"], "soon");
        assert_eq!(conf.get(&["departure_time_cutoff"]), Some(json!("soon")));
        // Typed accessor falls back to the default.
        assert_eq!(conf.departure_time_cutoff(), 10);
    }

    #[test]
    fn set_nested_creates_sections() {
        let mut conf = ConfigurationStore::new();
        conf.set(&["foo", "bar"], 1);
        assert_eq!(conf.get(&["foo", "bar"]), Some(json!(1)));
        assert_eq!(conf.get(&["foo"]), Some(json!({"bar": 1})));
    }

    #[test]
    fn set_through_scalar_replaces_it_with_section() {
        let mut conf = ConfigurationStore::new();
        conf.set(&["foo"], 5);
        conf.set(&["foo", "bar", "baz"], "x");
        assert_eq!(conf.get(&["foo"]), Some(json!({"bar": {"baz": "x"}})));

        conf.set(&["foo", "bar"], 1);
        conf.add(&["foo", "bar", "list"], 2);
        assert_eq!(conf.get(&["foo", "bar", "list"]), Some(json!([2])));
    }

    #[test]
    fn units_option() {
        let mut conf = ConfigurationStore::new();
        conf.set(&["units"], "american");
        assert_eq!(conf.units(), Units::American);
    }

    #[test]
    fn add_is_idempotent() {
        let mut conf = ConfigurationStore::new();
        conf.set(&["items"], json!([1, 2, 3]));
        conf.add(&["items"], 4);
        assert_eq!(conf.get(&["items"]), Some(json!([1, 2, 3, 4])));
        conf.add(&["items"], 4);
        assert_eq!(conf.get(&["items"]), Some(json!([1, 2, 3, 4])));
    }

    #[test]
    fn add_creates_missing_list() {
        let mut conf = ConfigurationStore::new();
        conf.add(&["ignore", "lines"], "58B");
        assert!(conf.contains(&["ignore", "lines"], "58B"));
    }

    #[test]
    fn contains_and_remove() {
        let mut conf = ConfigurationStore::new();
        conf.set(&["items"], json!([1, 2, 3]));
        assert!(conf.contains(&["items"], 1));
        assert!(!conf.contains(&["items"], 4));

        conf.remove(&["items"], 3);
        assert_eq!(conf.get(&["items"]), Some(json!([1, 2])));
        conf.remove(&["items"], 3);
        assert_eq!(conf.get(&["items"]), Some(json!([1, 2])));
        conf.remove(&["missing"], 3);
        assert_eq!(conf.get(&["missing"]), None);
    }

    #[test]
    fn register_provider() {
        let mut conf = ConfigurationStore::new();
        conf.register_provider("foo", map(json!({"type": 1})));
        assert_eq!(conf.get(&["providers", "foo", "type"]), Some(json!(1)));
        assert_eq!(conf.get_default(&["providers", "foo", "type"]), Some(json!(1)));
        assert_eq!(conf.provider_option("foo", "type"), Some(json!(1)));
    }

    #[test]
    fn register_provider_again_changes_nothing() {
        let mut conf = ConfigurationStore::new();
        conf.register_provider("foo", map(json!({"type": 1})));
        conf.set(&["providers", "foo", "type"], 2);
        conf.register_provider("foo", map(json!({"type": 3})));
        assert_eq!(conf.get(&["providers", "foo", "type"]), Some(json!(2)));
        assert_eq!(conf.get_default(&["providers", "foo", "type"]), Some(json!(1)));
    }

    #[test]
    fn register_provider_keeps_loaded_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pan-transit.json");
        std::fs::write(
            &path,
            r#"{"providers": {"foo": {"region": "waltti", "type": "bad"}}}"#,
        )
        .unwrap();

        let mut conf = ConfigurationStore::new();
        conf.read(&path).unwrap();
        assert_eq!(conf.get(&["providers", "foo", "type"]), Some(json!("bad")));

        conf.register_provider("foo", map(json!({"region": "hsl", "type": 1})));
        assert_eq!(conf.get(&["providers", "foo", "region"]), Some(json!("waltti")));
        assert_eq!(conf.get(&["providers", "foo", "type"]), Some(json!(1)));
    }

    #[test]
    fn write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pan-transit.json");

        let mut conf = ConfigurationStore::new();
        conf.set(&["units"], "american");
        conf.write(&path).unwrap();

        let mut loaded = ConfigurationStore::new();
        loaded.read(&path).unwrap();
        assert_eq!(loaded.units(), Units::American);
    }

    #[test]
    fn read_restores_provider_section() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pan-transit.json");

        let mut conf = ConfigurationStore::new();
        conf.register_provider("foo", map(json!({"type": 1})));
        conf.write(&path).unwrap();

        let mut loaded = ConfigurationStore::new();
        loaded.read(&path).unwrap();
        assert_eq!(loaded.get(&["providers", "foo", "type"]), Some(json!(1)));
    }

    #[test]
    fn write_prunes_unknown_options_and_stamps_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pan-transit.json");

        let mut conf = ConfigurationStore::new();
        conf.set(&["obsolete"], true);
        conf.write(&path).unwrap();

        let written: Value = persist::read_json(&path).unwrap();
        assert!(written.get("obsolete").is_none());
        assert_eq!(written["version"], json!(env!("CARGO_PKG_VERSION")));
        assert_eq!(written["units"], json!("metric"));
    }

    #[test]
    fn read_discards_bad_values_individually() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pan-transit.json");
        std::fs::write(
            &path,
            r#"{"departure_time_cutoff": "soon", "units": "british",
                "favorite_highlight_radius": 500.7, "provider": {"nested": 1},
                "version": "0.0.1"}"#,
        )
        .unwrap();

        let mut conf = ConfigurationStore::new();
        conf.read(&path).unwrap();
        assert_eq!(conf.departure_time_cutoff(), 10);
        assert_eq!(conf.units(), Units::British);
        assert_eq!(conf.favorite_highlight_radius(), 500);
        assert_eq!(conf.provider(), "digitransit_hsl");
        assert_eq!(conf.get(&["version"]), None);
    }

    #[test]
    fn read_missing_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let mut conf = ConfigurationStore::new();
        conf.read(&dir.path().join("missing.json")).unwrap();
        assert_eq!(conf, ConfigurationStore::new());
    }

    #[test]
    fn read_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pan-transit.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let mut conf = ConfigurationStore::new();
        assert!(conf.read(&path).is_err());
        assert_eq!(conf, ConfigurationStore::new());
    }
}
