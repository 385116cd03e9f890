// src/types.rs

/// Raw magnitudes, one per channel. Index 0 is the base of the shaft, the last index the tip.
pub type ChannelVector = Vec<u32>;
/// Per-channel `raw - baseline` delta, signed and unclamped.
pub type RelativeVector = Vec<i64>;
/// Per-channel engagement in [0.0, 1.0].
pub type NormalizedVector = Vec<f32>;

// 单次采样的分析结果
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsSnapshot {
    pub normalized: NormalizedVector,
    pub insertion: f32,
    pub focus: f32,
    /// `None` when there is no activity to locate.
    pub center: Option<f32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

// 停止输入为低电平有效
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinLevel {
    High,
    Low,
}

// 发送端状态机
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensingState {
    Idle,
    Streaming,
    Fault,
    Stopped,
}

// 接收端状态机
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceivingState {
    Uninitialized,
    Calibrating,
    Active,
}

/// One decoded frame on the receiving node, handed to every consumer.
#[derive(Clone, Debug)]
pub struct ReceivedFrame {
    pub sender: String,
    pub raw: ChannelVector,
    pub relative: RelativeVector,
    pub received_at_ms: u64,
    /// Time since the previous frame; zero for the first one.
    pub interval_ms: u64,
}
