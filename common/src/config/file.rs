use super::registry::ConfigFieldSpec;
use errors::{ConfigError, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::RwLock;

/// Loaded configuration file scoped to one module.
///
/// Lookups are dotted and case-insensitive. Runtime overrides (keyed by
/// lowercased path) sit on top; fields registered immutable reject them.
#[derive(Debug)]
pub struct ConfigAccessor {
    root: Value,
    fields: HashMap<String, ConfigFieldSpec>,
    overrides: RwLock<HashMap<String, Value>>,
    display: String,
}

/// Builds an accessor from a raw document.
///
/// `scope` selects a subtree: `(name, true)` was requested explicitly
/// (`--config-tag`) and must exist; `(name, false)` is the module's default
/// scope and falls back to the whole document when absent.
pub(crate) fn build(
    raw: Value,
    scope: Option<(&str, bool)>,
    fields: &[ConfigFieldSpec],
    env: &dyn Fn(&str) -> Option<String>,
    display: String,
) -> Result<ConfigAccessor> {
    let mut root = match scope {
        Some((name, explicit)) => match lookup(&raw, name) {
            Some(subtree) => subtree.clone(),
            None if explicit => return Err(ConfigError::ScopeNotFound(name.to_string()).into()),
            None => raw,
        },
        None => raw,
    };

    root = resolve_env(root, env)?;

    for field in fields {
        if let Some(default) = &field.default {
            if lookup(&root, &field.path).is_none() {
                insert_path(&mut root, &field.path, default.clone());
            }
        }
    }

    for field in fields {
        if field.required && lookup(&root, &field.path).is_none() {
            return Err(ConfigError::MissingField(field.path.clone()).into());
        }
    }

    let fields = fields
        .iter()
        .map(|f| (f.path.to_lowercase(), f.clone()))
        .collect();

    Ok(ConfigAccessor {
        root,
        fields,
        overrides: RwLock::new(HashMap::new()),
        display,
    })
}

/// Reads and validates a JSON config file from disk.
pub fn load(
    path: &str,
    scope: Option<(&str, bool)>,
    fields: &[ConfigFieldSpec],
) -> Result<ConfigAccessor> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Unreadable(Box::new(e)))?;
    let raw: Value =
        serde_json::from_str(&text).map_err(|e| ConfigError::Malformed(Box::new(e)))?;
    build(raw, scope, fields, &|name| std::env::var(name).ok(), path.to_string())
}

/// Eagerly replaces every `{"$env": "NAME"}` leaf with the variable's value.
fn resolve_env(value: Value, env: &dyn Fn(&str) -> Option<String>) -> Result<Value> {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(name)) = map.get("$env") {
                    let resolved = env(name)
                        .ok_or_else(|| ConfigError::EnvNotSet(name.clone()))?;
                    return Ok(Value::String(resolved));
                }
            }
            let mut out = Map::new();
            for (key, val) in map {
                out.insert(key, resolve_env(val, env)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_env(item, env)?);
            }
            Ok(Value::Array(out))
        }
        other => Ok(other),
    }
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        let map = current.as_object()?;
        current = map
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(segment))
            .map(|(_, v)| v)?;
    }
    Some(current)
}

fn insert_path(root: &mut Value, path: &str, value: Value) {
    if !root.is_object() {
        *root = Value::Object(Map::new());
    }
    let mut current = root;
    let segments: Vec<&str> = path.split('.').collect();
    for (idx, segment) in segments.iter().enumerate() {
        let map = current.as_object_mut().expect("object ensured above");
        let existing = map.keys().find(|k| k.eq_ignore_ascii_case(segment)).cloned();
        let key = existing.unwrap_or_else(|| segment.to_string());
        if idx + 1 == segments.len() {
            map.insert(key, value);
            return;
        }
        let slot = map.entry(key).or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = slot;
    }
}

impl ConfigAccessor {
    /// The scoped subtree, for whole-config deserialization.
    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        if let Ok(overrides) = self.overrides.read() {
            if let Some(value) = overrides.get(&path.to_lowercase()) {
                return Some(value.clone());
            }
        }
        self.get_original(path)
    }

    pub fn get_original(&self, path: &str) -> Option<Value> {
        lookup(&self.root, path)
            .cloned()
            .or_else(|| self.fields.get(&path.to_lowercase())?.default.clone())
    }

    pub fn override_value(&self, path: &str, value: Value) -> Result<()> {
        let key = path.to_lowercase();
        if let Some(spec) = self.fields.get(&key) {
            if !spec.mutable {
                return Err(ConfigError::Immutable(path.to_string()).into());
            }
        }
        self.overrides
            .write()
            .expect("config override lock poisoned")
            .insert(key, value);
        Ok(())
    }

    pub fn clear_override(&self, path: &str) {
        self.overrides
            .write()
            .expect("config override lock poisoned")
            .remove(&path.to_lowercase());
    }

    pub fn spec(&self, path: &str) -> Option<&ConfigFieldSpec> {
        self.fields.get(&path.to_lowercase())
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).as_ref().and_then(Value::as_f64)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).as_ref().and_then(Value::as_bool)
    }

    pub fn get_str(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::registry::ConfigFieldSpec;
    use super::*;
    use serde_json::json;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_scope_selection() {
        let raw = json!({"gate": {"must_have": ["ready"]}, "other": {}});
        let accessor =
            build(raw, Some(("gate", false)), &[], &no_env, "conf.json".into()).unwrap();
        assert_eq!(accessor.get("must_have"), Some(json!(["ready"])));
    }

    #[test]
    fn test_missing_default_scope_falls_back_to_document() {
        let raw = json!({"must_have": ["ready"]});
        let accessor =
            build(raw, Some(("gate", false)), &[], &no_env, "conf.json".into()).unwrap();
        assert_eq!(accessor.get("must_have"), Some(json!(["ready"])));
    }

    #[test]
    fn test_explicit_scope_must_exist() {
        let raw = json!({"gate": {}});
        let err = build(raw, Some(("lab", true)), &[], &no_env, "conf.json".into()).unwrap_err();
        assert!(err.to_string().contains("scope not found"));
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let raw = json!({"Dedup": {"Ignore_Fields": ["t"]}});
        let accessor = build(raw, None, &[], &no_env, "conf.json".into()).unwrap();
        assert_eq!(accessor.get("dedup.ignore_fields"), Some(json!(["t"])));
    }

    #[test]
    fn test_defaults_and_required() {
        let fields = vec![
            ConfigFieldSpec::new("merge.match_tolerance_ms").with_default(10),
            ConfigFieldSpec::new("merge.postfix").required(),
        ];

        let raw = json!({"merge": {"postfix": ["_a"]}});
        let accessor = build(raw, None, &fields, &no_env, "conf.json".into()).unwrap();
        assert_eq!(accessor.get_f64("merge.match_tolerance_ms"), Some(10.0));

        let raw = json!({"merge": {}});
        let err = build(raw, None, &fields, &no_env, "conf.json".into()).unwrap_err();
        assert!(err.to_string().contains("merge.postfix"));
    }

    #[test]
    fn test_env_indirection() {
        let raw = json!({"token": {"$env": "GATE_TOKEN"}, "nested": [{"$env": "GATE_TOKEN"}]});
        let env = |name: &str| (name == "GATE_TOKEN").then(|| "secret".to_string());
        let accessor = build(raw, None, &[], &env, "conf.json".into()).unwrap();
        assert_eq!(accessor.get("token"), Some(json!("secret")));
        assert_eq!(accessor.get("nested"), Some(json!(["secret"])));

        let raw = json!({"token": {"$env": "UNSET_VAR"}});
        let err = build(raw, None, &[], &no_env, "conf.json".into()).unwrap_err();
        assert!(err.to_string().contains("UNSET_VAR"));
    }

    #[test]
    fn test_overrides_respect_mutability() {
        let fields = vec![ConfigFieldSpec::new("gate.locked").with_default(1).immutable()];
        let raw = json!({"gate": {"open_ms": 5}});
        let accessor = build(raw, None, &fields, &no_env, "conf.json".into()).unwrap();

        accessor.override_value("gate.open_ms", json!(9)).unwrap();
        assert_eq!(accessor.get_f64("gate.open_ms"), Some(9.0));
        assert_eq!(accessor.get_original("gate.open_ms"), Some(json!(5)));
        accessor.clear_override("gate.open_ms");
        assert_eq!(accessor.get_f64("gate.open_ms"), Some(5.0));

        let err = accessor.override_value("gate.locked", json!(2)).unwrap_err();
        assert!(err.to_string().contains("not runtime-mutable"));
    }

    #[test]
    fn test_load_from_disk() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", r#"{"dedup": {"numeric_tolerance": 0.5}}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let accessor = load(&path, Some(("dedup", false)), &[]).unwrap();
        assert_eq!(accessor.get_f64("numeric_tolerance"), Some(0.5));
        assert_eq!(accessor.display(), path);

        let err = load("definitely_missing.json", None, &[]).unwrap_err();
        assert!(err.to_string().contains("not readable"));
    }

    #[test]
    fn test_malformed_json_is_fatal() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ nope").unwrap();
        let err = load(file.path().to_str().unwrap(), None, &[]).unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }
}
