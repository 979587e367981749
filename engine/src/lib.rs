pub mod delay;
pub mod dedup;
pub mod expr;
pub mod gate;
pub mod inject;
pub mod machine;
pub mod merge;
pub mod minrate;
pub mod reducer;
pub mod stalled;

pub use dedup::{Dedup, DedupConfig};
pub use delay::Delay;
pub use gate::{Gate, GateConfig};
pub use inject::{Inject, InjectConfig};
pub use machine::Machine;
pub use merge::{Merge, MergeConfig};
pub use minrate::Minrate;
pub use reducer::Reducer;
pub use stalled::{Stalled, StalledConfig};
