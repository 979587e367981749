//! Convenience imports for embedding the substrate in a host binary.

pub use common::channel::{ChannelId, ChannelPolicy, PolicyOverride};
pub use common::config::{CliValues, ConfigAccessor, ConfigFieldSpec, ParamSpec, PositionalSpec};
pub use common::record::tagging;
pub use common::Record;
pub use engine::{
    Dedup, DedupConfig, Delay, Gate, GateConfig, Inject, InjectConfig, Machine, Merge,
    MergeConfig, Minrate, Reducer, Stalled, StalledConfig,
};
pub use errors::{Error, ErrorKind, Result};
pub use transport::{Decoder, Protocol, ReadOptions, RecordStream, Stats, Target, WriteOptions, Writer};
