use common::config::{self, ConfigFieldSpec, ParamSpec, PositionalSpec};
use engine::merge::{Merge, MergeConfig};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use utils::time::now_ms;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    config::register_param(
        ParamSpec::value("config").with_description("merge configuration file"),
    );
    config::register_positionals(vec![PositionalSpec::variadic("sides")
        .with_description("side input paths, one per merged stream")]);
    config::register_config_field(
        ConfigFieldSpec::new("match_tolerance_ms")
            .with_default(10)
            .with_description("side records this close to the main timestamp are used as-is"),
    );
    config::register_config_field(
        ConfigFieldSpec::new("max_buffer_ms")
            .with_default(10_000)
            .with_description("bounded-mode window width"),
    );
    config::register_config_field(
        ConfigFieldSpec::new("allow_unbounded_delay")
            .with_description("per-side hold-last mode flags"),
    );
    config::register_config_field(
        ConfigFieldSpec::new("postfix")
            .with_description("per-side key postfixes, default _1, _2, ..."),
    );
    let module = modules::bootstrap("merge");

    let merge_config: MergeConfig = serde_json::from_value(module.config_root())
        .unwrap_or_else(|err| modules::fatal(err));
    let side_paths: Vec<PathBuf> = module
        .cli
        .positionals()
        .iter()
        .map(PathBuf::from)
        .collect();
    let mut merge = Merge::new(merge_config, side_paths.len());

    // Side readers funnel into one queue; closure of a side never ends the
    // merge, the sender just goes away.
    let (side_tx, mut side_rx) = mpsc::channel(64);
    for (index, path) in side_paths.into_iter().enumerate() {
        let mut stream = module.side_stream(index as u32 + 1, path);
        let tx = side_tx.clone();
        tokio::spawn(async move {
            while let Some(record) = stream.recv().await {
                if tx.send((index, record)).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(side_tx);

    let mut input = module.stdin_stream();
    let mut output = module.stdout_writer();
    let mut trim = tokio::time::interval(Duration::from_millis(1000));
    let mut sides_open = true;

    loop {
        tokio::select! {
            record = input.recv() => {
                let Some(record) = record else { break };
                let out = merge.on_main(record, now_ms());
                if let Err(err) = output.write(&out).await {
                    log::error!("{err}");
                }
            }
            side = side_rx.recv(), if sides_open => {
                match side {
                    Some((index, record)) => merge.on_side(index, record, now_ms()),
                    None => sides_open = false,
                }
            }
            _ = trim.tick() => merge.on_tick(now_ms()),
        }
    }
}
