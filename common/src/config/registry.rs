use serde_json::Value;

/// Declared command-line parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub long: String,
    pub short: Option<char>,
    pub env: Option<String>,
    pub default: Option<Value>,
    pub takes_value: bool,
    pub negatable: bool,
    pub required: bool,
    pub mutable: bool,
    pub description: String,
}

impl ParamSpec {
    /// A parameter that expects a value (`--name <value>` / `--name=value`).
    pub fn value(long: impl AsRef<str>) -> Self {
        ParamSpec {
            long: long.as_ref().to_string(),
            short: None,
            env: None,
            default: None,
            takes_value: true,
            negatable: false,
            required: false,
            mutable: true,
            description: String::new(),
        }
    }

    /// A boolean flag (`--name`, optionally `--no-name`).
    pub fn flag(long: impl AsRef<str>) -> Self {
        ParamSpec {
            long: long.as_ref().to_string(),
            short: None,
            env: None,
            default: Some(Value::Bool(false)),
            takes_value: false,
            negatable: false,
            required: false,
            mutable: true,
            description: String::new(),
        }
    }

    pub fn with_short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    pub fn with_env(mut self, env: impl AsRef<str>) -> Self {
        self.env = Some(env.as_ref().to_string());
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn negatable(mut self) -> Self {
        self.negatable = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self.default = None;
        self
    }

    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    pub fn with_description(mut self, description: impl AsRef<str>) -> Self {
        self.description = description.as_ref().to_string();
        self
    }
}

/// One slot of the positional schema.
#[derive(Debug, Clone)]
pub struct PositionalSpec {
    pub name: String,
    pub required: bool,
    pub variadic: bool,
    pub description: String,
}

impl PositionalSpec {
    pub fn required(name: impl AsRef<str>) -> Self {
        PositionalSpec {
            name: name.as_ref().to_string(),
            required: true,
            variadic: false,
            description: String::new(),
        }
    }

    pub fn optional(name: impl AsRef<str>) -> Self {
        PositionalSpec {
            name: name.as_ref().to_string(),
            required: false,
            variadic: false,
            description: String::new(),
        }
    }

    /// Zero-or-more trailing slot; must be registered last.
    pub fn variadic(name: impl AsRef<str>) -> Self {
        PositionalSpec {
            name: name.as_ref().to_string(),
            required: false,
            variadic: true,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl AsRef<str>) -> Self {
        self.description = description.as_ref().to_string();
        self
    }
}

/// Declared config-file field at a dotted, case-insensitive path.
#[derive(Debug, Clone)]
pub struct ConfigFieldSpec {
    pub path: String,
    pub default: Option<Value>,
    pub required: bool,
    pub mutable: bool,
    pub description: String,
}

impl ConfigFieldSpec {
    pub fn new(path: impl AsRef<str>) -> Self {
        ConfigFieldSpec {
            path: path.as_ref().to_string(),
            default: None,
            required: false,
            mutable: true,
            description: String::new(),
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    pub fn with_description(mut self, description: impl AsRef<str>) -> Self {
        self.description = description.as_ref().to_string();
        self
    }
}

/// Per-process declaration store, populated during module startup.
///
/// Registration mistakes are programming errors, not runtime conditions,
/// and panic immediately.
#[derive(Debug, Default)]
pub struct Registry {
    pub(crate) params: Vec<ParamSpec>,
    pub(crate) positionals: Vec<PositionalSpec>,
    pub(crate) config_fields: Vec<ConfigFieldSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register_param(&mut self, spec: ParamSpec) {
        if self.params.iter().any(|p| p.long == spec.long) {
            panic!("duplicate parameter registered: --{}", spec.long);
        }
        if let Some(short) = spec.short {
            if self.params.iter().any(|p| p.short == Some(short)) {
                panic!("duplicate short parameter registered: -{short}");
            }
        }
        self.params.push(spec);
    }

    pub fn register_positionals(&mut self, slots: Vec<PositionalSpec>) {
        if !self.positionals.is_empty() {
            panic!("positional schema registered twice");
        }
        for (idx, slot) in slots.iter().enumerate() {
            if slot.variadic && idx + 1 != slots.len() {
                panic!("variadic positional {} must be last", slot.name);
            }
        }
        self.positionals = slots;
    }

    pub fn register_config_field(&mut self, spec: ConfigFieldSpec) {
        if self
            .config_fields
            .iter()
            .any(|f| f.path.eq_ignore_ascii_case(&spec.path))
        {
            panic!("duplicate config field registered: {}", spec.path);
        }
        self.config_fields.push(spec);
    }

    pub fn param(&self, long: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.long == long)
    }

    pub fn param_by_short(&self, short: char) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.short == Some(short))
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn positionals(&self) -> &[PositionalSpec] {
        &self.positionals
    }

    pub fn config_fields(&self) -> &[ConfigFieldSpec] {
        &self.config_fields
    }

    pub fn config_field(&self, path: &str) -> Option<&ConfigFieldSpec> {
        self.config_fields
            .iter()
            .find(|f| f.path.eq_ignore_ascii_case(path))
    }
}
