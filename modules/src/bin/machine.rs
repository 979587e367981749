use common::config::{self, ParamSpec};
use engine::machine::Machine;
use utils::time::now_ms;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    config::register_param(
        ParamSpec::value("config")
            .required()
            .with_description("state machine definition file"),
    );
    let module = modules::bootstrap("machine");

    let mut machine = Machine::from_value(&module.config_root(), now_ms())
        .unwrap_or_else(|err| modules::fatal(err));

    let mut input = module.stdin_stream();
    let mut output = module.stdout_writer();

    while let Some(record) = input.recv().await {
        let out = machine.on_record(record, now_ms());
        if let Err(err) = output.write(&out).await {
            log::error!("{err}");
        }
    }
}
