use super::registry::{ParamSpec, Registry};

/// Parameters the substrate registers for every module.
pub fn register(registry: &mut Registry) {
    registry.register_param(
        ParamSpec::flag("do-tag")
            .negatable()
            .with_env("TMCP_DO_TAG")
            .with_default(true)
            .with_description("append provenance tags to meta.pipeline"),
    );
    registry.register_param(
        ParamSpec::flag("verbose")
            .negatable()
            .with_env("TMCP_VERBOSE")
            .with_description("emit per-second throughput statistics"),
    );
    registry.register_param(
        ParamSpec::flag("verbose-input")
            .negatable()
            .with_description("echo every decoded input record to stderr"),
    );
    registry.register_param(
        ParamSpec::flag("verbose-output")
            .negatable()
            .with_description("echo every encoded output record to stderr"),
    );
    registry.register_param(
        ParamSpec::value("verbose-log-level")
            .with_default("warn")
            .with_description("diagnostic level: none, error, warn or info"),
    );
    registry.register_param(
        ParamSpec::value("in-protocol")
            .with_default("ndjson")
            .immutable()
            .with_description("input wire format: ndjson or msgpack"),
    );
    registry.register_param(
        ParamSpec::value("out-protocol")
            .with_default("ndjson")
            .immutable()
            .with_description("output wire format: ndjson or msgpack"),
    );
    registry.register_param(
        ParamSpec::value("exit-on-close")
            .with_description("per-channel exit policy, channelId=bool,..."),
    );
    registry.register_param(
        ParamSpec::value("retry")
            .with_description("per-channel retry policy, channelId=bool,..."),
    );
    registry.register_param(
        ParamSpec::flag("exit-instead-of-kill")
            .negatable()
            .with_description("terminate with a clean exit instead of SIGTERM"),
    );
    registry.register_param(
        ParamSpec::value("config-tag")
            .with_description("config file scope to load"),
    );
    registry.register_param(
        ParamSpec::flag("help")
            .with_short('h')
            .with_description("print this usage block and exit"),
    );
}
