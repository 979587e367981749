use common::config::{self, PositionalSpec};
use std::path::PathBuf;
use transport::writer::ensure_target_exists;

const TAG: &str = "spl";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    config::register_positionals(vec![PositionalSpec::variadic("targets")
        .with_description("side target paths, fifos or regular files")]);
    let module = modules::bootstrap("split");

    let targets: Vec<PathBuf> = module
        .cli
        .positionals()
        .iter()
        .map(PathBuf::from)
        .collect();

    let mut sides = Vec::with_capacity(targets.len());
    for (index, path) in targets.iter().enumerate() {
        if let Err(err) = ensure_target_exists(path) {
            log::error!("{err}");
        }
        sides.push(module.side_writer(index as u32 + 1, path.clone()));
    }

    let mut input = module.stdin_stream();
    let mut output = module.stdout_writer();

    while let Some(mut record) = input.recv().await {
        record.append_tag(TAG);
        if let Err(err) = output.write(&record).await {
            log::error!("{err}");
        }
        for side in &mut sides {
            // Side failures are retried by the writer; they never touch the
            // primary chain.
            if let Err(err) = side.write(&record).await {
                log::error!("{err}");
            }
        }
    }
}
