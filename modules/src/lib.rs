//! Shared module bootstrap: every binary declares its own parameters, then
//! calls [`bootstrap`], which wires the standard parameter set, the logger,
//! the tagging flag, termination mode, channel policy overrides and the
//! throughput ticker in one place.

use common::channel::{self, ChannelId, PolicyOverride};
use common::config::{self, CliValues, ConfigAccessor};
use common::record::tagging;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use transport::reader::{self, ReadOptions, RecordStream, Source};
use transport::writer::{Target, WriteOptions, Writer};
use transport::{terminate, Protocol, Stats};

pub struct Module {
    pub name: &'static str,
    pub cli: &'static CliValues,
    pub config: Option<ConfigAccessor>,
    pub stats: Option<Arc<Stats>>,
    pub in_protocol: Protocol,
    pub out_protocol: Protocol,
    pub verbose_input: bool,
    pub verbose_output: bool,
}

/// Logs a fatal startup problem and exits non-zero.
pub fn fatal(err: impl std::fmt::Display) -> ! {
    log::error!("{err}");
    std::process::exit(1)
}

/// Resolves the universal parameters and process-wide services.
///
/// Must run inside the module's tokio runtime; usage errors print the
/// auto-generated help and exit 2 before anything else starts.
pub fn bootstrap(name: &'static str) -> Module {
    config::set_module_name(name);
    config::register_standard_params();
    let cli = config::load_cli();

    let config_path = cli.get_str("param.config");
    let mut level = utils::logger::parse_level(
        &cli.get_str("param.verbose-log-level")
            .unwrap_or_else(|| "warn".to_string()),
    );
    let verbose = cli.get_bool("param.verbose").unwrap_or(false);
    let verbose_input = cli.get_bool("param.verbose-input").unwrap_or(false);
    let verbose_output = cli.get_bool("param.verbose-output").unwrap_or(false);
    if verbose || verbose_input || verbose_output {
        // Throughput lines and record echoes log at info and must survive
        // the default warn filter.
        level = level.max(log::LevelFilter::Info);
    }
    utils::logger::init(name, config_path.as_deref(), level);

    tagging::set_enabled(cli.get_bool("param.do-tag").unwrap_or(true));
    terminate::set_exit_instead_of_kill(
        cli.get_bool("param.exit-instead-of-kill").unwrap_or(false),
    );

    if let Err(err) = channel::set_global_overrides(
        cli.get_str("param.exit-on-close").as_deref(),
        cli.get_str("param.retry").as_deref(),
    ) {
        eprintln!("{err}");
        eprintln!("{}", config::usage());
        std::process::exit(2);
    }

    let in_protocol = protocol_param(cli, "param.in-protocol");
    let out_protocol = protocol_param(cli, "param.out-protocol");

    let stats = if verbose {
        let stats = Stats::new();
        stats.spawn_ticker();
        Some(stats)
    } else {
        None
    };

    let config = config_path.map(|path| {
        config::load_config_file(&path, Some(name)).unwrap_or_else(|err| fatal(err))
    });

    Module {
        name,
        cli,
        config,
        stats,
        in_protocol,
        out_protocol,
        verbose_input,
        verbose_output,
    }
}

fn protocol_param(cli: &CliValues, path: &str) -> Protocol {
    let raw = cli.get_str(path).unwrap_or_else(|| "ndjson".to_string());
    Protocol::from_str(&raw).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{}", config::usage());
        std::process::exit(2);
    })
}

impl Module {
    /// Primary input from stdin under the standard policy.
    pub fn stdin_stream(&self) -> RecordStream {
        self.stdin_stream_with(PolicyOverride::default())
    }

    pub fn stdin_stream_with(&self, policy: PolicyOverride) -> RecordStream {
        reader::spawn(
            Source::Stdin,
            ReadOptions {
                channel: ChannelId::Stdin,
                protocol: self.in_protocol,
                policy,
                linger: None,
                verbose_input: self.verbose_input,
            },
            self.stats.clone(),
        )
    }

    /// Side input from a path; side channels never terminate the module.
    pub fn side_stream(&self, index: u32, path: PathBuf) -> RecordStream {
        reader::spawn(
            Source::Path(path),
            ReadOptions {
                channel: ChannelId::Side(index),
                protocol: self.in_protocol,
                policy: PolicyOverride::default(),
                linger: None,
                verbose_input: self.verbose_input,
            },
            None,
        )
    }

    /// Primary output to stdout under the standard policy.
    pub fn stdout_writer(&self) -> Writer {
        Writer::open(
            Target::Stdout,
            WriteOptions {
                channel: ChannelId::Stdout,
                protocol: self.out_protocol,
                policy: PolicyOverride::default(),
                linger: None,
                verbose_output: self.verbose_output,
            },
            self.stats.clone(),
        )
    }

    /// Side output with retry semantics; failures stay off the primary chain.
    pub fn side_writer(&self, index: u32, path: PathBuf) -> Writer {
        Writer::open(
            Target::Path(path),
            WriteOptions {
                channel: ChannelId::Side(index),
                protocol: self.out_protocol,
                policy: PolicyOverride::exit_on_close(false).with_retry(true),
                linger: None,
                verbose_output: false,
            },
            None,
        )
    }

    /// Scoped config subtree, or an empty object for config-less runs.
    pub fn config_root(&self) -> serde_json::Value {
        self.config
            .as_ref()
            .map(|c| c.root().clone())
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()))
    }
}
