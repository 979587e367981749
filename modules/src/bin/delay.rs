use common::channel::PolicyOverride;
use common::config::{self, ParamSpec};
use engine::delay::Delay;
use errors::UsageError;
use transport::terminate;
use utils::time::now_ms;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    config::register_param(
        ParamSpec::value("delay-ms")
            .required()
            .with_description("logical delay applied to every record"),
    );
    config::register_param(
        ParamSpec::value("max-delay-ms").with_description("upper cap on the delay"),
    );
    let module = modules::bootstrap("delay");

    let Some(delay_ms) = module.cli.get_f64("param.delay-ms").filter(|d| *d >= 0.0) else {
        eprintln!(
            "{}",
            errors::Error::from(UsageError::Invalid(
                "--delay-ms must be a non-negative number".to_string()
            ))
        );
        eprintln!("{}", config::usage());
        std::process::exit(2);
    };
    let max_delay_ms = module.cli.get_f64("param.max-delay-ms");
    let mut delay = Delay::new(delay_ms, max_delay_ms);

    // EOF must reach the loop so the buffer can flush; the exit policy is
    // applied here, after the drain, not in the reader.
    let mut input = module.stdin_stream_with(PolicyOverride::exit_on_close(false));
    let mut output = module.stdout_writer();

    while let Some(record) = input.recv().await {
        for out in delay.on_record(record, now_ms()) {
            if let Err(err) = output.write(&out).await {
                log::error!("{err}");
            }
        }
    }

    for out in delay.flush() {
        if let Err(err) = output.write(&out).await {
            log::error!("{err}");
        }
    }
    terminate::terminate(0);
}
