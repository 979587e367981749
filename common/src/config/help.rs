use super::registry::Registry;
use serde_json::{Map, Value};

/// Renders the auto-generated usage block: signature, parameter table,
/// positional list, and a JSON skeleton of the registered config fields.
pub fn render_usage(module: &str, registry: &Registry) -> String {
    let mut out = String::new();

    out.push_str(&format!("usage: {module} [options]"));
    for slot in registry.positionals() {
        let name = if slot.variadic {
            format!("{}...", slot.name)
        } else {
            slot.name.clone()
        };
        if slot.required {
            out.push_str(&format!(" <{name}>"));
        } else {
            out.push_str(&format!(" [{name}]"));
        }
    }
    out.push('\n');

    if !registry.params().is_empty() {
        out.push_str("\nparameters:\n");
        for spec in registry.params() {
            let mut forms = format!("--{}", spec.long);
            if spec.negatable {
                forms.push_str(&format!(", --no-{}", spec.long));
            }
            if let Some(short) = spec.short {
                forms.push_str(&format!(", -{short}"));
            }
            if spec.takes_value {
                forms.push_str(" <value>");
            }
            out.push_str(&format!("  {forms}\n"));

            let mut notes = Vec::new();
            if let Some(env) = &spec.env {
                notes.push(format!("env {env}"));
            }
            if let Some(default) = &spec.default {
                notes.push(format!("default {default}"));
            }
            if spec.required {
                notes.push("required".to_string());
            }
            if spec.mutable {
                notes.push("mutable".to_string());
            }
            if !notes.is_empty() {
                out.push_str(&format!("      [{}]\n", notes.join(", ")));
            }
            if !spec.description.is_empty() {
                out.push_str(&format!("      {}\n", spec.description));
            }
        }
    }

    if !registry.positionals().is_empty() {
        out.push_str("\npositionals:\n");
        for slot in registry.positionals() {
            let kind = match (slot.required, slot.variadic) {
                (_, true) => "variadic",
                (true, false) => "required",
                (false, false) => "optional",
            };
            out.push_str(&format!("  {} [{}]", slot.name, kind));
            if !slot.description.is_empty() {
                out.push_str(&format!("  {}", slot.description));
            }
            out.push('\n');
        }
    }

    if !registry.config_fields().is_empty() {
        out.push_str("\nconfig schema:\n");
        let skeleton = config_skeleton(registry);
        let pretty = serde_json::to_string_pretty(&skeleton)
            .unwrap_or_else(|_| "{}".to_string());
        for line in pretty.lines() {
            out.push_str(&format!("  {line}\n"));
        }
    }

    out
}

fn config_skeleton(registry: &Registry) -> Value {
    let mut root = Value::Object(Map::new());
    for field in registry.config_fields() {
        let placeholder = match &field.default {
            Some(default) => default.clone(),
            None if field.required => Value::String(format!("<required: {}>", field.description)),
            None => Value::String(format!("<{}>", field.description)),
        };
        insert(&mut root, &field.path, placeholder);
    }
    root
}

fn insert(root: &mut Value, path: &str, value: Value) {
    let mut current = root;
    let segments: Vec<&str> = path.split('.').collect();
    for (idx, segment) in segments.iter().enumerate() {
        let map = match current.as_object_mut() {
            Some(map) => map,
            None => return,
        };
        if idx + 1 == segments.len() {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::super::registry::{ConfigFieldSpec, ParamSpec, PositionalSpec, Registry};
    use super::*;

    #[test]
    fn test_usage_contains_all_sections() {
        let mut registry = Registry::new();
        registry.register_param(
            ParamSpec::value("interval-ms")
                .with_env("TMCP_INTERVAL_MS")
                .with_description("minimum emission interval"),
        );
        registry.register_param(ParamSpec::flag("verbose").negatable());
        registry.register_positionals(vec![
            PositionalSpec::required("config"),
            PositionalSpec::variadic("targets"),
        ]);
        registry.register_config_field(
            ConfigFieldSpec::new("minrate.tag")
                .with_default("minr")
                .with_description("pipeline tag"),
        );

        let usage = render_usage("minrate", &registry);
        assert!(usage.starts_with("usage: minrate [options] <config> [targets...]"));
        assert!(usage.contains("--interval-ms <value>"));
        assert!(usage.contains("env TMCP_INTERVAL_MS"));
        assert!(usage.contains("--no-verbose"));
        assert!(usage.contains("config [required]"));
        assert!(usage.contains("\"minrate\""));
        assert!(usage.contains("\"tag\": \"minr\""));
    }
}
