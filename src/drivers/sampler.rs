#[cfg(test)]
use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::time::Duration;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::drivers::LinkError;
use crate::types::ChannelVector;
/// Something that can read one magnitude per touch channel on demand.
pub trait ChannelSampler {
    fn channel_count(&self) -> usize;
    fn read(&mut self) -> Result<ChannelVector, LinkError>;
}
impl<S: ChannelSampler + ?Sized> ChannelSampler for Box<S> {
    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }
    fn read(&mut self) -> Result<ChannelVector, LinkError> {
        (**self).read()
    }
}
/// In-memory sampler useful for tests and deterministic playback.
///
/// Once the queue runs dry the last vector is repeated; an empty sampler reports a fault.
#[cfg(test)]
pub struct ManualSampler {
    channel_count: usize,
    queue: VecDeque<ChannelVector>,
    last: Option<ChannelVector>,
}
#[cfg(test)]
impl ManualSampler {
    pub fn new(channel_count: usize, vectors: impl IntoIterator<Item = ChannelVector>) -> Self {
        Self {
            channel_count,
            queue: vectors.into_iter().collect(),
            last: None,
        }
    }
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}
#[cfg(test)]
impl ChannelSampler for ManualSampler {
    fn channel_count(&self) -> usize {
        self.channel_count
    }
    fn read(&mut self) -> Result<ChannelVector, LinkError> {
        if let Some(next) = self.queue.pop_front() {
            if next.len() != self.channel_count {
                return Err(LinkError::Sampler(format!(
                    "queued vector has {} values",
                    next.len()
                )));
            }
            self.last = Some(next);
        }
        self.last
            .clone()
            .ok_or_else(|| LinkError::Sampler("no samples queued".into()))
    }
}
/// Idle noise around a fixed baseline plus a touch bump that wanders along the shaft.
pub struct SimulatedSampler {
    channel_count: usize,
    idle_level: u32,
    touch_amplitude: u32,
    noise: u32,
    phase: f32,
    rng: StdRng,
}
impl SimulatedSampler {
    pub fn new(channel_count: usize) -> Self {
        Self {
            channel_count,
            idle_level: 28_000,
            touch_amplitude: 30_000,
            noise: 250,
            phase: 0.0,
            rng: StdRng::from_entropy(),
        }
    }
    #[cfg(test)]
    pub fn with_seed(channel_count: usize, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new(channel_count)
        }
    }
}
impl ChannelSampler for SimulatedSampler {
    fn channel_count(&self) -> usize {
        self.channel_count
    }
    fn read(&mut self) -> Result<ChannelVector, LinkError> {
        self.phase += 0.05;
        let span = self.channel_count.saturating_sub(1).max(1) as f32;
        // Position of the simulated grip, sweeping base -> tip -> base.
        let grip = (self.phase.sin() * 0.5 + 0.5) * span;
        let values = (0..self.channel_count)
            .map(|i| {
                let distance = (i as f32 - grip).abs();
                let bump = (1.0 - distance / 2.0).max(0.0) * self.touch_amplitude as f32;
                let jitter = self.rng.gen_range(0..=self.noise);
                self.idle_level + bump as u32 + jitter
            })
            .collect();
        Ok(values)
    }
}
/// Reads one sample per text line, values separated by commas or whitespace.
pub struct LineSampler<R: BufRead> {
    source: String,
    channel_count: usize,
    reader: R,
    line: String,
}
/// Touch controller bridged over a serial port.
pub type SerialSampler = LineSampler<BufReader<Box<dyn serialport::SerialPort>>>;
impl SerialSampler {
    pub fn open(port_name: &str, baud_rate: u32, channel_count: usize) -> Result<Self, LinkError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_secs(2))
            .open()?;
        Ok(LineSampler::new(port_name, channel_count, BufReader::new(port)))
    }
}
impl<R: BufRead> LineSampler<R> {
    pub fn new(source: &str, channel_count: usize, reader: R) -> Self {
        Self {
            source: source.to_string(),
            channel_count,
            reader,
            line: String::new(),
        }
    }
}
impl<R: BufRead> ChannelSampler for LineSampler<R> {
    fn channel_count(&self) -> usize {
        self.channel_count
    }
    fn read(&mut self) -> Result<ChannelVector, LinkError> {
        self.line.clear();
        let read = self
            .reader
            .read_line(&mut self.line)
            .map_err(|e| LinkError::Sampler(format!("{}: {e}", self.source)))?;
        if read == 0 {
            return Err(LinkError::Sampler(format!("{}: end of stream", self.source)));
        }
        parse_sample_line(&self.line, self.channel_count)
    }
}
/// Parses one text sample line into a channel vector of exactly `channel_count` values.
///
/// A short or partial line is a sampling fault, not a configuration error.
pub fn parse_sample_line(line: &str, channel_count: usize) -> Result<ChannelVector, LinkError> {
    let values = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|field| !field.is_empty())
        .map(|field| {
            field
                .parse::<u32>()
                .map_err(|_| LinkError::Sampler(format!("unparsable magnitude {field:?}")))
        })
        .collect::<Result<ChannelVector, _>>()?;
    if values.len() != channel_count {
        return Err(LinkError::Sampler(format!(
            "expected {channel_count} magnitudes, got {}",
            values.len()
        )));
    }
    Ok(values)
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn manual_sampler_repeats_last_vector() {
        let mut sampler = ManualSampler::new(2, vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(sampler.read().unwrap(), vec![1, 2]);
        assert_eq!(sampler.read().unwrap(), vec![3, 4]);
        assert_eq!(sampler.read().unwrap(), vec![3, 4]);
        assert_eq!(sampler.remaining(), 0);
    }
    #[test]
    fn empty_manual_sampler_is_a_fault() {
        let mut sampler = ManualSampler::new(3, Vec::new());
        assert!(matches!(sampler.read(), Err(LinkError::Sampler(_))));
    }
    #[test]
    fn manual_sampler_rejects_wrong_length() {
        let mut sampler = ManualSampler::new(3, vec![vec![1, 2]]);
        assert!(matches!(sampler.read(), Err(LinkError::Sampler(_))));
    }
    #[test]
    fn simulated_sampler_produces_fixed_length() {
        let mut sampler = SimulatedSampler::with_seed(9, 7);
        for _ in 0..20 {
            let values = sampler.read().unwrap();
            assert_eq!(values.len(), 9);
            assert!(values.iter().all(|v| *v >= 28_000));
        }
    }
    #[test]
    fn sample_lines_accept_commas_and_spaces() {
        assert_eq!(parse_sample_line("10, 20 30\r\n", 3).unwrap(), vec![10, 20, 30]);
        assert!(matches!(parse_sample_line("10,20", 3), Err(LinkError::Sampler(_))));
        assert!(matches!(parse_sample_line("10,x,30", 3), Err(LinkError::Sampler(_))));
        let partial = parse_sample_line("100", 3).unwrap_err();
        assert!(!partial.is_fatal());
    }
    #[test]
    fn line_sampler_recovers_after_partial_line() {
        let input = std::io::Cursor::new("00\n1,2,3\n4 5 6\n");
        let mut sampler = LineSampler::new("test", 3, input);
        assert!(matches!(sampler.read(), Err(LinkError::Sampler(_))));
        assert_eq!(sampler.read().unwrap(), vec![1, 2, 3]);
        assert_eq!(sampler.read().unwrap(), vec![4, 5, 6]);
        assert!(matches!(sampler.read(), Err(LinkError::Sampler(_))));
    }
}
