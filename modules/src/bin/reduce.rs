use common::config::{self, ParamSpec};
use engine::reducer::Reducer;
use utils::time::now_ms;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    config::register_param(
        ParamSpec::value("config")
            .required()
            .with_description("reducer rule definition file"),
    );
    let module = modules::bootstrap("reduce");

    let mut reducer = Reducer::from_value(&module.config_root())
        .unwrap_or_else(|err| modules::fatal(err));

    let mut input = module.stdin_stream();
    let mut output = module.stdout_writer();

    while let Some(record) = input.recv().await {
        if let Some(out) = reducer.on_record(record, now_ms()) {
            if let Err(err) = output.write(&out).await {
                log::error!("{err}");
            }
        }
    }
}
