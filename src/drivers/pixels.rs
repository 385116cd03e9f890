use std::io::{self, Write};
use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetBackgroundColor};
use crate::drivers::LinkError;
use crate::types::Rgb;
/// Addressable LED strip. Nothing is visible until `flush` commits the frame.
pub trait PixelSink {
    fn len(&self) -> usize;
    fn set_pixel(&mut self, index: usize, color: Rgb);
    fn flush(&mut self) -> Result<(), LinkError>;
}
/// In-memory strip; keeps the last committed frame.
#[cfg(test)]
pub struct FrameBuffer {
    pending: Vec<Rgb>,
    committed: Vec<Rgb>,
    flushes: usize,
}
#[cfg(test)]
impl FrameBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            pending: vec![Rgb::default(); len],
            committed: vec![Rgb::default(); len],
            flushes: 0,
        }
    }
    pub fn committed(&self) -> &[Rgb] {
        &self.committed
    }
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}
#[cfg(test)]
impl PixelSink for FrameBuffer {
    fn len(&self) -> usize {
        self.pending.len()
    }
    fn set_pixel(&mut self, index: usize, color: Rgb) {
        if let Some(px) = self.pending.get_mut(index) {
            *px = color;
        }
    }
    fn flush(&mut self) -> Result<(), LinkError> {
        self.committed.copy_from_slice(&self.pending);
        self.flushes += 1;
        Ok(())
    }
}
/// Draws the strip as a row of 24-bit colour blocks on a terminal.
pub struct TerminalStrip<W: Write> {
    pixels: Vec<Rgb>,
    out: W,
}
impl TerminalStrip<io::Stdout> {
    pub fn stdout(len: usize) -> Self {
        Self::new(len, io::stdout())
    }
}
impl<W: Write> TerminalStrip<W> {
    pub fn new(len: usize, out: W) -> Self {
        Self {
            pixels: vec![Rgb::default(); len],
            out,
        }
    }
    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}
impl<W: Write> PixelSink for TerminalStrip<W> {
    fn len(&self) -> usize {
        self.pixels.len()
    }
    fn set_pixel(&mut self, index: usize, color: Rgb) {
        if let Some(px) = self.pixels.get_mut(index) {
            *px = color;
        }
    }
    fn flush(&mut self) -> Result<(), LinkError> {
        for Rgb(r, g, b) in &self.pixels {
            let color = Color::Rgb { r: *r, g: *g, b: *b };
            queue!(self.out, SetBackgroundColor(color), Print("  "))?;
        }
        queue!(self.out, ResetColor, Print("\r\n"))?;
        self.out.flush()?;
        Ok(())
    }
}
