pub mod config;
pub mod consumer;
pub mod pacer;
pub mod phase;
pub mod producer;
pub mod record;
pub mod runlog;
pub mod stats;
pub mod transport;

pub use config::*;
pub use consumer::*;
pub use pacer::*;
pub use phase::*;
pub use producer::*;
pub use record::*;
pub use runlog::*;
pub use stats::*;
