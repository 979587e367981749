use common::config::{self, ConfigFieldSpec, ParamSpec};
use engine::dedup::{Dedup, DedupConfig};
use utils::time::now_ms;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    config::register_param(
        ParamSpec::value("config").with_description("deduplication configuration file"),
    );
    config::register_config_field(
        ConfigFieldSpec::new("ignore_fields")
            .with_description("data keys excluded from the comparison"),
    );
    config::register_config_field(
        ConfigFieldSpec::new("check_fields")
            .with_description("whitelist restricting the comparison"),
    );
    config::register_config_field(
        ConfigFieldSpec::new("numeric_tolerance")
            .with_default(0)
            .with_description("numeric values within this distance compare equal"),
    );
    config::register_config_field(
        ConfigFieldSpec::new("debug").with_description("log every dropped record"),
    );
    let module = modules::bootstrap("dedup");

    let dedup_config: DedupConfig = serde_json::from_value(module.config_root())
        .unwrap_or_else(|err| modules::fatal(err));
    let mut dedup = Dedup::new(dedup_config);

    let mut input = module.stdin_stream();
    let mut output = module.stdout_writer();

    while let Some(record) = input.recv().await {
        if let Some(out) = dedup.on_record(record, now_ms()) {
            if let Err(err) = output.write(&out).await {
                log::error!("{err}");
            }
        }
    }
}
