// src/drivers/mod.rs
// 外部协作者：采样、无线链路、存储、灯带、停止按钮与时钟
pub mod control;
pub mod error;
pub mod pixels;
pub mod sampler;
pub mod store;
pub mod transport;
// 公开导出这些模块里的结构体，方便外部调用
pub use control::{Clock, FlagInput, StopInput, SystemClock};
pub use error::LinkError;
pub use pixels::{PixelSink, TerminalStrip};
pub use sampler::{ChannelSampler, LineSampler, SerialSampler, SimulatedSampler};
pub use store::{FileStore, KeyValueStore};
pub use transport::{Transport, UdpTransport, MAX_DATAGRAM};
// 测试替身
#[cfg(test)]
pub use control::ManualClock;
#[cfg(test)]
pub use pixels::FrameBuffer;
#[cfg(test)]
pub use sampler::ManualSampler;
#[cfg(test)]
pub use store::MemoryStore;
#[cfg(test)]
pub use transport::LoopbackTransport;
