use super::registry::{ParamSpec, PositionalSpec, Registry};
use errors::{ConfigError, Result, UsageError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

/// Resolved command line: CLI beats ENV beats default.
///
/// Paths have the form `param.<long>` or `positionals.<index|name>`.
/// Runtime overrides sit on top of the resolved values and can be cleared;
/// `get_original` bypasses them.
#[derive(Debug)]
pub struct CliValues {
    params: HashMap<String, Value>,
    specs: HashMap<String, ParamSpec>,
    positionals: Vec<String>,
    slots: Vec<PositionalSpec>,
    overrides: RwLock<HashMap<String, Value>>,
    help: bool,
}

pub(crate) fn parse_bool_str(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parses argv plus environment against the registry.
///
/// `env` is injected so tests control the environment.
pub fn parse(
    registry: &Registry,
    args: &[String],
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<CliValues> {
    let mut params: HashMap<String, Value> = HashMap::new();
    let mut positionals: Vec<String> = Vec::new();

    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if arg == "--" {
            positionals.extend(iter.cloned());
            break;
        }
        if let Some(body) = arg.strip_prefix("--") {
            let (name, inline) = match body.split_once('=') {
                Some((n, v)) => (n, Some(v.to_string())),
                None => (body, None),
            };
            if inline.is_none() {
                if let Some(base) = name.strip_prefix("no-") {
                    if let Some(spec) = registry.param(base) {
                        if spec.negatable && !spec.takes_value {
                            params.insert(base.to_string(), Value::Bool(false));
                            continue;
                        }
                    }
                }
            }
            let spec = registry
                .param(name)
                .ok_or_else(|| UsageError::UnknownParam(format!("--{name}")))?;
            apply_param(&mut params, spec, inline, &mut iter)?;
        } else if arg.len() >= 2 && arg.starts_with('-') && !is_number_like(arg) {
            let mut chars = arg[1..].chars();
            let short = chars.next().unwrap_or('-');
            let rest: String = chars.collect();
            let inline = rest.strip_prefix('=').map(String::from);
            if !rest.is_empty() && inline.is_none() {
                return Err(UsageError::UnknownParam(arg.clone()).into());
            }
            let spec = registry
                .param_by_short(short)
                .ok_or_else(|| UsageError::UnknownParam(format!("-{short}")))?;
            apply_param(&mut params, spec, inline, &mut iter)?;
        } else {
            positionals.push(arg.clone());
        }
    }

    // ENV fills anything the command line left untouched.
    for spec in registry.params() {
        if params.contains_key(&spec.long) {
            continue;
        }
        if let Some(env_name) = &spec.env {
            if let Some(raw) = env(env_name) {
                let value = if spec.takes_value {
                    Value::String(raw)
                } else {
                    match parse_bool_str(&raw) {
                        Some(b) => Value::Bool(b),
                        None => continue,
                    }
                };
                params.insert(spec.long.clone(), value);
            }
        }
    }

    // Defaults close the gaps.
    for spec in registry.params() {
        if !params.contains_key(&spec.long) {
            if let Some(default) = &spec.default {
                params.insert(spec.long.clone(), default.clone());
            }
        }
    }

    let help = params
        .get("help")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if !help {
        for spec in registry.params() {
            if spec.required && !params.contains_key(&spec.long) {
                return Err(UsageError::MissingRequired(spec.long.clone()).into());
            }
        }
        bind_positionals(registry.positionals(), &positionals)?;
    }

    let specs = registry
        .params()
        .iter()
        .map(|s| (s.long.clone(), s.clone()))
        .collect();

    Ok(CliValues {
        params,
        specs,
        positionals,
        slots: registry.positionals().to_vec(),
        overrides: RwLock::new(HashMap::new()),
        help,
    })
}

fn apply_param(
    params: &mut HashMap<String, Value>,
    spec: &ParamSpec,
    inline: Option<String>,
    iter: &mut std::iter::Peekable<std::slice::Iter<'_, String>>,
) -> Result<()> {
    if spec.takes_value {
        let value = match inline {
            Some(v) => v,
            None => iter
                .next()
                .cloned()
                .ok_or_else(|| UsageError::MissingValue(spec.long.clone()))?,
        };
        params.insert(spec.long.clone(), Value::String(value));
    } else {
        let value = match inline {
            Some(raw) => parse_bool_str(&raw).ok_or_else(|| {
                UsageError::Invalid(format!("--{}={raw} is not a boolean", spec.long))
            })?,
            None => true,
        };
        params.insert(spec.long.clone(), Value::Bool(value));
    }
    Ok(())
}

fn is_number_like(arg: &str) -> bool {
    arg[1..].chars().next().map(|c| c.is_ascii_digit() || c == '.') == Some(true)
}

fn bind_positionals(slots: &[PositionalSpec], given: &[String]) -> Result<()> {
    let variadic = slots.last().map(|s| s.variadic).unwrap_or(false);
    let fixed = if variadic { slots.len() - 1 } else { slots.len() };
    if given.len() > fixed && !variadic {
        return Err(UsageError::ExtraPositional(given[fixed].clone()).into());
    }
    for (idx, slot) in slots.iter().enumerate() {
        if slot.variadic {
            if slot.required && given.len() <= idx {
                return Err(UsageError::MissingPositional(slot.name.clone()).into());
            }
        } else if slot.required && given.len() <= idx {
            return Err(UsageError::MissingPositional(slot.name.clone()).into());
        }
    }
    Ok(())
}

impl CliValues {
    pub fn help_requested(&self) -> bool {
        self.help
    }

    /// Resolved value at `path`, runtime overrides included.
    pub fn get(&self, path: &str) -> Option<Value> {
        if let Ok(overrides) = self.overrides.read() {
            if let Some(value) = overrides.get(path) {
                return Some(value.clone());
            }
        }
        self.get_original(path)
    }

    /// Resolved value ignoring runtime overrides.
    pub fn get_original(&self, path: &str) -> Option<Value> {
        if let Some(name) = path.strip_prefix("param.") {
            return self.params.get(name).cloned();
        }
        if let Some(which) = path.strip_prefix("positionals.") {
            if let Ok(index) = which.parse::<usize>() {
                return self.positionals.get(index).cloned().map(Value::String);
            }
            let (idx, slot) = self
                .slots
                .iter()
                .enumerate()
                .find(|(_, s)| s.name == which)?;
            if slot.variadic {
                return Some(Value::Array(
                    self.positionals[idx.min(self.positionals.len())..]
                        .iter()
                        .cloned()
                        .map(Value::String)
                        .collect(),
                ));
            }
            return self.positionals.get(idx).cloned().map(Value::String);
        }
        None
    }

    pub fn spec(&self, path: &str) -> Option<&ParamSpec> {
        path.strip_prefix("param.").and_then(|n| self.specs.get(n))
    }

    /// Installs a runtime override; immutable parameters reject it.
    pub fn override_value(&self, path: &str, value: Value) -> Result<()> {
        if let Some(spec) = self.spec(path) {
            if !spec.mutable {
                return Err(ConfigError::Immutable(path.to_string()).into());
            }
        }
        self.overrides
            .write()
            .expect("cli override lock poisoned")
            .insert(path.to_string(), value);
        Ok(())
    }

    pub fn clear_override(&self, path: &str) {
        self.overrides
            .write()
            .expect("cli override lock poisoned")
            .remove(path);
    }

    pub fn get_str(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        match self.get(path)? {
            Value::Bool(b) => Some(b),
            Value::String(s) => parse_bool_str(&s),
            _ => None,
        }
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        match self.get(path)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn positionals(&self) -> &[String] {
        &self.positionals
    }
}

#[cfg(test)]
mod tests {
    use super::super::registry::{ParamSpec, PositionalSpec, Registry};
    use super::*;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_param(ParamSpec::flag("help").with_short('h'));
        registry.register_param(
            ParamSpec::flag("verbose")
                .negatable()
                .with_env("TMCP_VERBOSE"),
        );
        registry.register_param(
            ParamSpec::value("interval-ms").with_env("TMCP_INTERVAL_MS"),
        );
        registry.register_param(ParamSpec::value("mode").with_default("auto").immutable());
        registry
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cli_beats_env_beats_default() {
        let registry = registry();
        let env = |name: &str| match name {
            "TMCP_INTERVAL_MS" => Some("500".to_string()),
            _ => None,
        };

        let values = parse(&registry, &args(&["--interval-ms", "100"]), &env).unwrap();
        assert_eq!(values.get_f64("param.interval-ms"), Some(100.0));

        let values = parse(&registry, &args(&[]), &env).unwrap();
        assert_eq!(values.get_f64("param.interval-ms"), Some(500.0));

        let values = parse(&registry, &args(&[]), &no_env).unwrap();
        assert_eq!(values.get("param.interval-ms"), None);
        assert_eq!(values.get_str("param.mode"), Some("auto".to_string()));
    }

    #[test]
    fn test_flag_forms() {
        let registry = registry();
        let values = parse(&registry, &args(&["--verbose"]), &no_env).unwrap();
        assert_eq!(values.get_bool("param.verbose"), Some(true));

        let values = parse(&registry, &args(&["--no-verbose"]), &no_env).unwrap();
        assert_eq!(values.get_bool("param.verbose"), Some(false));

        let env = |name: &str| (name == "TMCP_VERBOSE").then(|| "yes".to_string());
        let values = parse(&registry, &args(&[]), &env).unwrap();
        assert_eq!(values.get_bool("param.verbose"), Some(true));
    }

    #[test]
    fn test_inline_and_short_forms() {
        let registry = registry();
        let values = parse(&registry, &args(&["--interval-ms=250"]), &no_env).unwrap();
        assert_eq!(values.get_f64("param.interval-ms"), Some(250.0));

        let values = parse(&registry, &args(&["-h"]), &no_env).unwrap();
        assert!(values.help_requested());
    }

    #[test]
    fn test_usage_errors() {
        let registry = registry();
        let err = parse(&registry, &args(&["--bogus"]), &no_env).unwrap_err();
        assert!(err.is_usage());

        let err = parse(&registry, &args(&["--interval-ms"]), &no_env).unwrap_err();
        assert!(err.to_string().contains("expects a value"));
    }

    #[test]
    fn test_required_param() {
        let mut registry = registry();
        registry.register_param(ParamSpec::value("target").required());

        let err = parse(&registry, &args(&[]), &no_env).unwrap_err();
        assert!(err.to_string().contains("--target"));

        // -h bypasses required validation so usage is printable.
        let values = parse(&registry, &args(&["-h"]), &no_env).unwrap();
        assert!(values.help_requested());
    }

    #[test]
    fn test_positionals_by_index_name_and_variadic() {
        let mut registry = registry();
        registry.register_positionals(vec![
            PositionalSpec::required("config"),
            PositionalSpec::variadic("targets"),
        ]);

        let values =
            parse(&registry, &args(&["conf.json", "a.fifo", "b.fifo"]), &no_env).unwrap();
        assert_eq!(
            values.get_str("positionals.0"),
            Some("conf.json".to_string())
        );
        assert_eq!(
            values.get_str("positionals.config"),
            Some("conf.json".to_string())
        );
        assert_eq!(
            values.get("positionals.targets"),
            Some(serde_json::json!(["a.fifo", "b.fifo"]))
        );

        let err = parse(&registry, &args(&[]), &no_env).unwrap_err();
        assert!(err.to_string().contains("config"));
    }

    #[test]
    fn test_excess_positionals_rejected_without_variadic() {
        let mut registry = registry();
        registry.register_positionals(vec![PositionalSpec::required("config")]);
        let err = parse(&registry, &args(&["a", "b"]), &no_env).unwrap_err();
        assert!(err.to_string().contains("unexpected extra positional"));
    }

    #[test]
    fn test_runtime_overrides() {
        let registry = registry();
        let values = parse(&registry, &args(&["--interval-ms", "100"]), &no_env).unwrap();

        values
            .override_value("param.interval-ms", Value::String("900".to_string()))
            .unwrap();
        assert_eq!(values.get_f64("param.interval-ms"), Some(900.0));
        assert_eq!(values.get_original("param.interval-ms"), Some(Value::String("100".to_string())));

        values.clear_override("param.interval-ms");
        assert_eq!(values.get_f64("param.interval-ms"), Some(100.0));

        let err = values
            .override_value("param.mode", Value::String("manual".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("not runtime-mutable"));
    }

    #[test]
    fn test_double_dash_stops_flag_parsing() {
        let mut registry = registry();
        registry.register_positionals(vec![PositionalSpec::variadic("targets")]);
        let values = parse(&registry, &args(&["--", "--not-a-flag"]), &no_env).unwrap();
        assert_eq!(values.positionals(), &["--not-a-flag".to_string()]);
    }

    #[test]
    fn test_negative_number_is_positional() {
        let mut registry = registry();
        registry.register_positionals(vec![PositionalSpec::variadic("values")]);
        let values = parse(&registry, &args(&["-12.5"]), &no_env).unwrap();
        assert_eq!(values.positionals(), &["-12.5".to_string()]);
    }
}
