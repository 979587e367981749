mod error;

pub use error::{
    BoxError, ChannelError, CodecError, ConfigError, Error, ErrorKind, ExprError, MachineError,
    Result, RuleError, TransportError, UsageError,
};
