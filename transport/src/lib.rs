pub mod codec;
pub mod reader;
pub mod stats;
pub mod terminate;
pub mod writer;

pub use codec::{Decoder, Protocol};
pub use reader::{ReadOptions, RecordStream, Source};
pub use stats::Stats;
pub use writer::{Target, WriteOptions, Writer};
