//! Parameter, positional and config-file registration plus CLI/ENV
//! resolution.
//!
//! Modules declare everything at startup, then call [`load_cli`] once; the
//! result is memoized for the life of the process. Usage violations print
//! the auto-generated help block and exit non-zero.

pub mod cli;
pub mod file;
pub mod help;
pub mod registry;
pub mod standard;

pub use cli::CliValues;
pub use file::ConfigAccessor;
pub use registry::{ConfigFieldSpec, ParamSpec, PositionalSpec, Registry};

use errors::Result;
use once_cell::sync::{Lazy, OnceCell};
use std::sync::RwLock;

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(Registry::new()));
static MODULE_NAME: OnceCell<String> = OnceCell::new();
static CLI: OnceCell<CliValues> = OnceCell::new();

/// Names the running module; used in the usage signature and diagnostics.
pub fn set_module_name(name: impl AsRef<str>) {
    let _ = MODULE_NAME.set(name.as_ref().to_string());
}

pub fn module_name() -> String {
    MODULE_NAME
        .get()
        .cloned()
        .unwrap_or_else(|| "module".to_string())
}

pub fn register_param(spec: ParamSpec) {
    REGISTRY
        .write()
        .expect("registry lock poisoned")
        .register_param(spec);
}

pub fn register_positionals(slots: Vec<PositionalSpec>) {
    REGISTRY
        .write()
        .expect("registry lock poisoned")
        .register_positionals(slots);
}

pub fn register_config_field(spec: ConfigFieldSpec) {
    REGISTRY
        .write()
        .expect("registry lock poisoned")
        .register_config_field(spec);
}

/// Registers the substrate-wide parameter set.
pub fn register_standard_params() {
    let mut registry = REGISTRY.write().expect("registry lock poisoned");
    standard::register(&mut registry);
}

/// Current usage block for this module.
pub fn usage() -> String {
    let registry = REGISTRY.read().expect("registry lock poisoned");
    help::render_usage(&module_name(), &registry)
}

/// Parses argv and environment exactly once.
///
/// On `-h`/`--help` the usage block goes to stdout and the process exits 0;
/// on a usage error it goes to stderr and the process exits 2.
pub fn load_cli() -> &'static CliValues {
    CLI.get_or_init(|| {
        let registry = REGISTRY.read().expect("registry lock poisoned");
        let args: Vec<String> = std::env::args().skip(1).collect();
        match cli::parse(&registry, &args, &|name| std::env::var(name).ok()) {
            Ok(values) => {
                if values.help_requested() {
                    println!("{}", help::render_usage(&module_name(), &registry));
                    std::process::exit(0);
                }
                values
            }
            Err(err) => {
                eprintln!("{err}");
                eprintln!("{}", help::render_usage(&module_name(), &registry));
                std::process::exit(2);
            }
        }
    })
}

/// Loads a JSON config file scoped by `--config-tag` or the module default.
pub fn load_config_file(path: &str, default_scope: Option<&str>) -> Result<ConfigAccessor> {
    let cli = load_cli();
    let tag = cli.get_str("param.config-tag");
    let registry = REGISTRY.read().expect("registry lock poisoned");
    let fields = registry.config_fields().to_vec();
    drop(registry);
    match tag.as_deref() {
        Some(tag) => file::load(path, Some((tag, true)), &fields),
        None => file::load(path, default_scope.map(|s| (s, false)), &fields),
    }
}
