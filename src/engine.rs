// src/engine.rs
// 两个节点的主循环：
// - 发送端：采样 -> 编码 -> 发送 -> 等待刷新间隔；发送失败进入冷却后恢复
// - 接收端：先用前 K 帧求基线，之后每帧减去基线交给消费者
// 单线程、协作式；所有挂起点都是具名方法 (await_*)
use std::sync::mpsc::Sender;
use std::time::Duration;
use log::{debug, error, info, warn};
use crate::analysis::TouchAnalyzer;
use crate::calibration::{BaselineAverager, ReferenceBaseline};
use crate::codec::FrameCodec;
use crate::drivers::{ChannelSampler, Clock, LinkError, StopInput, Transport};
use crate::types::{ChannelVector, MetricsSnapshot, ReceivedFrame, ReceivingState, SensingState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopTiming {
    pub refresh_interval: Duration,
    pub fault_cooldown: Duration,
}
impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_millis(100),
            fault_cooldown: Duration::from_secs(2),
        }
    }
}

/// Receives every frame the display node accepts after calibration.
pub trait FrameConsumer {
    fn consume(&mut self, frame: &ReceivedFrame);
    /// Called once when the receiving loop ends.
    fn finish(&mut self) {}
}
// 转发给其他线程（与界面线程的通讯方式相同）
impl FrameConsumer for Sender<ReceivedFrame> {
    fn consume(&mut self, frame: &ReceivedFrame) {
        self.send(frame.clone()).ok();
    }
}

/// Reports receive time, spacing and the relative vector of each frame.
pub struct LogConsumer;
impl FrameConsumer for LogConsumer {
    fn consume(&mut self, frame: &ReceivedFrame) {
        info!(
            "{} {} {:?}",
            frame.received_at_ms, frame.interval_ms, frame.relative
        );
    }
}

/// Prints grip metrics for each received raw vector.
pub struct MetricsConsumer {
    analyzer: TouchAnalyzer,
}
impl MetricsConsumer {
    pub fn new(analyzer: TouchAnalyzer) -> Self {
        Self { analyzer }
    }
}
impl FrameConsumer for MetricsConsumer {
    fn consume(&mut self, frame: &ReceivedFrame) {
        match self.analyzer.analyze(&frame.raw) {
            Ok(m) => log_metrics(&m),
            Err(e) => warn!("metrics skipped: {e}"),
        }
    }
}

pub fn log_metrics(m: &MetricsSnapshot) {
    debug!("normalized {:?}", m.normalized);
    info!(
        "focus: {:.3} insertion: {:.3} center: {}",
        m.focus,
        m.insertion,
        m.center
            .map(|c| format!("{c:.3}"))
            .unwrap_or_else(|| "none".to_owned())
    );
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SensingStats {
    pub sent: u64,
    pub faults: u64,
    pub skipped: u64,
}

/// Sensing node: samples at a fixed period and pushes each vector to one peer.
pub struct SensingNode<S, T, I, C>
where
    S: ChannelSampler,
    T: Transport,
    I: StopInput,
    C: Clock,
{
    sampler: S,
    transport: T,
    peer: T::Peer,
    stop: I,
    clock: C,
    codec: FrameCodec,
    timing: LoopTiming,
    state: SensingState,
    stats: SensingStats,
}
impl<S, T, I, C> SensingNode<S, T, I, C>
where
    S: ChannelSampler,
    T: Transport,
    I: StopInput,
    C: Clock,
{
    pub fn new(
        sampler: S,
        transport: T,
        peer: T::Peer,
        stop: I,
        clock: C,
        codec: FrameCodec,
        timing: LoopTiming,
    ) -> Result<Self, LinkError> {
        if sampler.channel_count() != codec.channel_count() {
            return Err(LinkError::ChannelMismatch {
                expected: codec.channel_count(),
                actual: sampler.channel_count(),
            });
        }
        Ok(Self {
            sampler,
            transport,
            peer,
            stop,
            clock,
            codec,
            timing,
            state: SensingState::Idle,
            stats: SensingStats::default(),
        })
    }
    #[cfg(test)]
    pub fn state(&self) -> SensingState {
        self.state
    }
    #[cfg(test)]
    pub fn stats(&self) -> SensingStats {
        self.stats
    }
    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }
    #[cfg(test)]
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
    #[cfg(test)]
    pub fn clock(&self) -> &C {
        &self.clock
    }
    fn await_next_sample(&mut self) -> Result<ChannelVector, LinkError> {
        self.sampler.read()
    }
    fn await_interval(&mut self, duration: Duration) {
        self.clock.sleep(duration);
    }
    /// Performs one transition. Only configuration mismatches are returned as errors.
    pub fn step(&mut self) -> Result<SensingState, LinkError> {
        self.state = match self.state {
            SensingState::Idle => {
                let activated = self
                    .transport
                    .activate()
                    .and_then(|_| self.transport.add_peer(&self.peer));
                match activated {
                    Ok(()) => {
                        info!("Streaming to {}", self.peer);
                        SensingState::Streaming
                    }
                    Err(e) => {
                        error!("Radio activation failed: {e}");
                        self.await_interval(self.timing.fault_cooldown);
                        SensingState::Idle
                    }
                }
            }
            SensingState::Streaming => self.stream_cycle()?,
            SensingState::Fault => {
                self.await_interval(self.timing.fault_cooldown);
                SensingState::Streaming
            }
            SensingState::Stopped => SensingState::Stopped,
        };
        Ok(self.state)
    }
    fn stream_cycle(&mut self) -> Result<SensingState, LinkError> {
        if self.stop.asserted() {
            info!("Stop input pressed, stopping...");
            return Ok(SensingState::Stopped);
        }
        let values = match self.await_next_sample() {
            Ok(values) => values,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Sample skipped: {e}");
                self.stats.skipped += 1;
                self.await_interval(self.timing.refresh_interval);
                return Ok(SensingState::Streaming);
            }
        };
        let frame = self.codec.encode(&values)?;
        if let Err(e) = self.transport.send(&self.peer, &frame) {
            self.stats.faults += 1;
            error!(
                "{e}; cooling down for {} ms",
                self.timing.fault_cooldown.as_millis()
            );
            return Ok(SensingState::Fault);
        }
        self.stats.sent += 1;
        self.await_interval(self.timing.refresh_interval);
        Ok(SensingState::Streaming)
    }
    /// Runs until the stop input is asserted.
    pub fn run(&mut self) -> Result<SensingStats, LinkError> {
        while self.step()? != SensingState::Stopped {}
        info!(
            "Sensing stopped: {} sent, {} faults, {} skipped",
            self.stats.sent, self.stats.faults, self.stats.skipped
        );
        Ok(self.stats)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReceivingStats {
    pub frames: u64,
    pub malformed: u64,
    pub faults: u64,
}

/// Display node: calibrates a baseline from the first frames, then forwards deltas.
pub struct ReceivingNode<T: Transport, C: Clock> {
    transport: T,
    clock: C,
    codec: FrameCodec,
    averager: BaselineAverager,
    baseline: Option<ReferenceBaseline>,
    consumers: Vec<Box<dyn FrameConsumer>>,
    fault_cooldown: Duration,
    state: ReceivingState,
    last_frame_ms: Option<u64>,
    stats: ReceivingStats,
}
impl<T: Transport, C: Clock> ReceivingNode<T, C> {
    pub fn new(
        transport: T,
        clock: C,
        codec: FrameCodec,
        baseline_frames: usize,
        fault_cooldown: Duration,
    ) -> Self {
        Self {
            transport,
            clock,
            averager: BaselineAverager::new(codec.channel_count(), baseline_frames),
            codec,
            baseline: None,
            consumers: Vec::new(),
            fault_cooldown,
            state: ReceivingState::Uninitialized,
            last_frame_ms: None,
            stats: ReceivingStats::default(),
        }
    }
    pub fn with_consumer(mut self, consumer: impl FrameConsumer + 'static) -> Self {
        self.consumers.push(Box::new(consumer));
        self
    }
    #[cfg(test)]
    pub fn state(&self) -> ReceivingState {
        self.state
    }
    #[cfg(test)]
    pub fn stats(&self) -> ReceivingStats {
        self.stats
    }
    #[cfg(test)]
    pub fn baseline(&self) -> Option<&ReferenceBaseline> {
        self.baseline.as_ref()
    }
    fn await_next_frame(&mut self) -> Result<(T::Peer, Vec<u8>), LinkError> {
        self.transport.receive_next()
    }
    fn await_interval(&mut self, duration: Duration) {
        self.clock.sleep(duration);
    }
    /// Waits for the next well-formed frame. `Ok(None)` means the cycle was skipped.
    fn next_vector(&mut self) -> Result<Option<(T::Peer, ChannelVector)>, LinkError> {
        let (peer, bytes) = match self.await_next_frame() {
            Ok(received) => received,
            Err(LinkError::TransportClosed) => return Err(LinkError::TransportClosed),
            Err(e) => {
                self.stats.faults += 1;
                error!("{e}; cooling down for {} ms", self.fault_cooldown.as_millis());
                self.await_interval(self.fault_cooldown);
                return Ok(None);
            }
        };
        match self.codec.decode(&bytes) {
            Ok(values) => Ok(Some((peer, values))),
            Err(e) => {
                self.stats.malformed += 1;
                warn!("Dropped frame from {peer}: {e}");
                Ok(None)
            }
        }
    }
    /// Performs one transition; returns `TransportClosed` once the link is gone.
    pub fn step(&mut self) -> Result<ReceivingState, LinkError> {
        self.state = match self.state {
            ReceivingState::Uninitialized => match self.transport.activate() {
                Ok(()) => {
                    info!("Radio active; averaging the first frames for a baseline");
                    ReceivingState::Calibrating
                }
                Err(e) => {
                    error!("Radio activation failed: {e}");
                    self.await_interval(self.fault_cooldown);
                    ReceivingState::Uninitialized
                }
            },
            ReceivingState::Calibrating => match self.next_vector()? {
                Some((_, values)) => match self.averager.push(&values)? {
                    Some(baseline) => {
                        info!("refs= {:?}", baseline.values());
                        self.baseline = Some(baseline);
                        ReceivingState::Active
                    }
                    None => ReceivingState::Calibrating,
                },
                None => ReceivingState::Calibrating,
            },
            ReceivingState::Active => {
                if let Some((peer, raw)) = self.next_vector()? {
                    self.forward(peer.to_string(), raw)?;
                }
                ReceivingState::Active
            }
        };
        Ok(self.state)
    }
    fn forward(&mut self, sender: String, raw: ChannelVector) -> Result<(), LinkError> {
        let relative = match &self.baseline {
            Some(baseline) => baseline.relative(&raw)?,
            None => return Ok(()),
        };
        let now = self.clock.now_ms();
        let interval_ms = self
            .last_frame_ms
            .map(|last| now.saturating_sub(last))
            .unwrap_or(0);
        self.last_frame_ms = Some(now);
        let frame = ReceivedFrame {
            sender,
            raw,
            relative,
            received_at_ms: now,
            interval_ms,
        };
        debug!("frame from {} {:?}", frame.sender, frame.relative);
        for consumer in &mut self.consumers {
            consumer.consume(&frame);
        }
        self.stats.frames += 1;
        Ok(())
    }
    /// Runs for the rest of the session. Returns only when the transport is closed.
    pub fn run(&mut self) -> Result<ReceivingStats, LinkError> {
        let result = loop {
            match self.step() {
                Ok(_) => {}
                Err(LinkError::TransportClosed) => break Ok(self.stats),
                Err(e) => break Err(e),
            }
        };
        for consumer in &mut self.consumers {
            consumer.finish();
        }
        info!(
            "Receiving ended: {} frames, {} malformed, {} faults",
            self.stats.frames, self.stats.malformed, self.stats.faults
        );
        result
    }
}

/// Samples, analyzes and reports metrics every `interval` until the stop input is asserted.
pub fn run_local_analysis<S, I, C>(
    sampler: &mut S,
    analyzer: &TouchAnalyzer,
    stop: &mut I,
    clock: &mut C,
    interval: Duration,
    mut report: impl FnMut(&MetricsSnapshot),
) -> Result<u64, LinkError>
where
    S: ChannelSampler,
    I: StopInput,
    C: Clock,
{
    if sampler.channel_count() != analyzer.channel_count() {
        return Err(LinkError::ChannelMismatch {
            expected: analyzer.channel_count(),
            actual: sampler.channel_count(),
        });
    }
    let mut reports = 0;
    while !stop.asserted() {
        match analyzer.read_and_analyze(sampler) {
            Ok(snapshot) => {
                report(&snapshot);
                reports += 1;
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("Sample skipped: {e}"),
        }
        clock.sleep(interval);
    }
    Ok(reports)
}
