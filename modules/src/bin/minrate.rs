use common::config::{self, ParamSpec};
use engine::minrate::Minrate;
use errors::UsageError;
use std::time::Duration;
use utils::time::now_ms;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    config::register_param(
        ParamSpec::value("interval-ms").with_description("minimum emission interval in ms"),
    );
    config::register_param(
        ParamSpec::value("rate").with_description("minimum emission rate in Hz"),
    );
    let module = modules::bootstrap("minrate");

    let interval = module.cli.get_f64("param.interval-ms");
    let rate = module.cli.get_f64("param.rate");
    let interval_ms = match (interval, rate) {
        (Some(ms), None) if ms > 0.0 => ms,
        (None, Some(hz)) if hz > 0.0 => 1000.0 / hz,
        _ => {
            eprintln!(
                "{}",
                errors::Error::from(UsageError::Conflict(
                    "exactly one of --interval-ms or --rate".to_string()
                ))
            );
            eprintln!("{}", config::usage());
            std::process::exit(2);
        }
    };

    let mut minrate = Minrate::new(interval_ms);
    let mut input = module.stdin_stream();
    let mut output = module.stdout_writer();
    let mut ticker = tokio::time::interval(Duration::from_millis(minrate.tick_ms() as u64));

    loop {
        tokio::select! {
            record = input.recv() => {
                let Some(record) = record else { break };
                let out = minrate.on_record(record, now_ms());
                if let Err(err) = output.write(&out).await {
                    log::error!("{err}");
                }
            }
            _ = ticker.tick() => {
                if let Some(clone) = minrate.on_tick(now_ms()) {
                    if let Err(err) = output.write(&clone).await {
                        log::error!("{err}");
                    }
                }
            }
        }
    }
}
