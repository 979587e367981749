use common::config::{self, ConfigFieldSpec, ParamSpec};
use engine::stalled::{Stalled, StalledConfig};
use utils::time::now_ms;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    config::register_param(
        ParamSpec::value("config")
            .required()
            .with_description("stall threshold configuration file"),
    );
    config::register_config_field(
        ConfigFieldSpec::new("threshold_ms")
            .required()
            .with_description("logical gap above which a record is marked stalled"),
    );
    config::register_config_field(
        ConfigFieldSpec::new("field")
            .with_default("stalled")
            .with_description("data key receiving the stall flag"),
    );
    let module = modules::bootstrap("stalled");

    let stalled_config: StalledConfig = serde_json::from_value(module.config_root())
        .unwrap_or_else(|err| modules::fatal(err));
    let mut stalled = Stalled::new(stalled_config);

    let mut input = module.stdin_stream();
    let mut output = module.stdout_writer();

    while let Some(record) = input.recv().await {
        let out = stalled.on_record(record, now_ms());
        if let Err(err) = output.write(&out).await {
            log::error!("{err}");
        }
    }
}
