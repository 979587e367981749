use common::config::{self, ParamSpec};
use engine::inject::{Inject, InjectConfig};
use utils::time::now_ms;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    config::register_param(
        ParamSpec::value("config").with_description("injected field configuration file"),
    );
    let module = modules::bootstrap("inject");

    let inject_config: InjectConfig = serde_json::from_value(module.config_root())
        .unwrap_or_else(|err| modules::fatal(err));
    let inject = Inject::new(inject_config);

    let mut input = module.stdin_stream();
    let mut output = module.stdout_writer();

    while let Some(record) = input.recv().await {
        let out = inject.on_record(record, now_ms());
        if let Err(err) = output.write(&out).await {
            log::error!("{err}");
        }
    }
}
