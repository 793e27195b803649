//! Audio subsystem module

pub mod channel;
pub mod device;
pub mod memory;
pub mod queue;
pub mod sample;

pub use channel::{ChannelOptions, OutputChannel};
pub use device::{CpalOutput, OutputDevice, OutputPort};
pub use memory::MemoryDevice;
pub use queue::{Readiness, SampleQueue};
pub use sample::Sample;
