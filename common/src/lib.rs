mod bit_buffer3;
mod buffer3;
pub mod log_setup;

pub use bit_buffer3::{BitBuffer3, BitIter};
pub use buffer3::Buffer3;
pub use log_setup::setup_logging;
