// src/visualizer.rs
// 灯环：上下两条弧各 led_count/2 颗灯，通道颜色镜像到两条弧
// 亮度跟随通道自身强度，色相跟随通道相对于平均值的偏差
use log::warn;
use crate::drivers::{LinkError, PixelSink};
use crate::engine::FrameConsumer;
use crate::types::{ReceivedFrame, Rgb};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingLayout {
    pub led_count: usize,
    /// Ring position of channel 0 on the top arc.
    pub first_led: usize,
}
impl RingLayout {
    pub fn leds_per_arch(&self) -> usize {
        self.led_count / 2
    }
    /// Top and bottom ring positions for a channel.
    pub fn positions(&self, channel: usize) -> (usize, usize) {
        let top = self.first_led + channel;
        (top, top + self.leds_per_arch())
    }
    pub fn fits(&self, channel_count: usize) -> bool {
        self.first_led + channel_count <= self.leds_per_arch()
    }
}
impl Default for RingLayout {
    fn default() -> Self {
        Self {
            led_count: 32,
            first_led: 4,
        }
    }
}

/// Standard six-sector HSV to RGB, all components in [0.0, 1.0].
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (v, v, v);
    }
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match (sector as i32).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}

fn to_byte(c: f32) -> u8 {
    (c * 256.0).clamp(0.0, 255.0) as u8
}

/// Scales values against `max_value` into [0.0, 1.0]; negatives count as zero.
pub fn scale_values(values: &[i64], max_value: u32) -> Vec<f32> {
    let max_value = max_value.max(1) as f64;
    values
        .iter()
        .map(|v| ((*v).max(0) as f64 / max_value).min(1.0) as f32)
        .collect()
}

/// One colour per channel from already-scaled values.
pub fn channel_colors(scaled: &[f32]) -> Vec<Rgb> {
    if scaled.is_empty() {
        return Vec::new();
    }
    let average = scaled.iter().sum::<f32>() / scaled.len() as f32;
    scaled
        .iter()
        .map(|value| {
            let value = value.clamp(0.0, 1.0);
            let hue = ((value - average) + 0.5).clamp(0.0, 1.0);
            let (r, g, b) = hsv_to_rgb(hue, 1.0, value);
            Rgb(to_byte(r), to_byte(g), to_byte(b))
        })
        .collect()
}

/// Maps per-channel engagement onto an LED ring.
pub struct LedRing<P: PixelSink> {
    sink: P,
    layout: RingLayout,
    max_value: u32,
    channel_count: usize,
}
impl<P: PixelSink> LedRing<P> {
    /// Clears the whole ring once; afterwards only channel positions are rewritten.
    pub fn new(
        mut sink: P,
        layout: RingLayout,
        max_value: u32,
        channel_count: usize,
    ) -> Result<Self, LinkError> {
        if !layout.fits(channel_count) || sink.len() < layout.led_count {
            return Err(LinkError::Config(format!(
                "{channel_count} channels from LED {} do not fit a {}-LED ring of {} pixels",
                layout.first_led,
                layout.led_count,
                sink.len()
            )));
        }
        for index in 0..layout.led_count {
            sink.set_pixel(index, Rgb::default());
        }
        sink.flush()?;
        Ok(Self {
            sink,
            layout,
            max_value,
            channel_count,
        })
    }
    #[cfg(test)]
    pub fn sink(&self) -> &P {
        &self.sink
    }
    /// Displays raw-magnitude deltas, scaled against the configured maximum.
    pub fn display_values(&mut self, values: &[i64]) -> Result<(), LinkError> {
        let scaled = scale_values(values, self.max_value);
        self.display_scaled(&scaled)
    }
    /// Displays values that are already in [0.0, 1.0], e.g. a normalized vector.
    pub fn display_scaled(&mut self, scaled: &[f32]) -> Result<(), LinkError> {
        if scaled.len() != self.channel_count {
            return Err(LinkError::ChannelMismatch {
                expected: self.channel_count,
                actual: scaled.len(),
            });
        }
        for (channel, color) in channel_colors(scaled).into_iter().enumerate() {
            let (top, bottom) = self.layout.positions(channel);
            self.sink.set_pixel(top, color);
            self.sink.set_pixel(bottom, color);
        }
        self.sink.flush()
    }
}
impl<P: PixelSink> FrameConsumer for LedRing<P> {
    fn consume(&mut self, frame: &ReceivedFrame) {
        if let Err(e) = self.display_values(&frame.relative) {
            warn!("LED update skipped: {e}");
        }
    }
}
