use common::config::{self, ParamSpec};
use engine::gate::{Gate, GateConfig};
use std::time::Duration;
use utils::time::now_ms;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    config::register_param(
        ParamSpec::value("config").with_description("activation block configuration file"),
    );
    let module = modules::bootstrap("gate");

    let gate_config = GateConfig::from_value(&module.config_root())
        .unwrap_or_else(|err| modules::fatal(err));
    let mut gate = Gate::new(gate_config, now_ms());

    let mut input = module.stdin_stream();
    let mut output = module.stdout_writer();
    let mut ticker = tokio::time::interval(Duration::from_millis(1000));

    loop {
        tokio::select! {
            record = input.recv() => {
                let Some(record) = record else { break };
                if let Some(out) = gate.on_record(record, now_ms()) {
                    if let Err(err) = output.write(&out).await {
                        log::error!("{err}");
                    }
                }
            }
            _ = ticker.tick() => gate.on_tick(now_ms()),
        }
    }
}
