//! Events - raw captures and decoded events
//!
//! - Capture      - one trigger worth of undecoded adc codes, 
//!                  one block per active channel, plus the 
//!                  trigger cell. Produced by the acquisition 
//!                  driver or the file reader.
//!
//! - DecodedEvent - calibrated, voltage converted and time 
//!                  aligned result of a capture. Immutable 
//!                  once it has been assembled.
//!
use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

#[cfg(feature = "random")] 
use crate::FromRandom;
#[cfg(feature = "random")]
use rand::Rng;
#[cfg(feature = "random")]
use crate::constants::NCELLS;

/// Event information which is not needed for 
/// decoding, but passed through to the sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventMetadata {
  pub event_id     : u32,
  pub board_serial : u16,
  /// Time of the trigger, as recorded by the 
  /// acquisition computer
  pub timestamp    : Option<NaiveDateTime>,
}

impl EventMetadata {
  pub fn new() -> Self {
    Self {
      event_id     : 0,
      board_serial : 0,
      timestamp    : None,
    }
  }
}

impl Default for EventMetadata {
  fn default() -> Self {
    Self::new()
  }
}

/// Adc codes of a single channel 
#[derive(Debug, Clone, PartialEq)]
pub struct RawChannel {
  /// 1-based channel id
  pub channel : u8,
  pub adc     : Vec<u16>,
}

/// One trigger worth of raw data
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
  pub meta         : EventMetadata,
  pub trigger_cell : u16,
  pub channels     : Vec<RawChannel>,
}

impl Capture {
  
  pub fn new() -> Self {
    Self {
      meta         : EventMetadata::new(),
      trigger_cell : 0,
      channels     : Vec::<RawChannel>::new(),
    }
  }

  pub fn add_channel(&mut self, channel : u8, adc : Vec<u16>) {
    self.channels.push(RawChannel { channel, adc });
  }

  /// Channel ids in the order they were read out
  pub fn get_active_channels(&self) -> Vec<u8> {
    self.channels.iter().map(|c| c.channel).collect()
  }

  pub fn get_channel(&self, channel : u8) -> Option<&RawChannel> {
    self.channels.iter().find(|c| c.channel == channel)
  }
}

impl Default for Capture {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for Capture {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<Capture: event {}, board #{}, trigger cell {}, channels {:?}>",
           self.meta.event_id,
           self.meta.board_serial,
           self.trigger_cell,
           self.get_active_channels())
  }
}

#[cfg(feature = "random")]
impl FromRandom for Capture {

  fn from_random() -> Self {
    let mut rng          = rand::thread_rng();
    let mut capture      = Self::new();
    capture.meta.event_id     = rng.gen::<u32>();
    capture.meta.board_serial = rng.gen::<u16>();
    capture.trigger_cell = rng.gen_range(0..NCELLS as u16);
    let n_chan = rng.gen_range(1..=4u8);
    for ch in 1..=n_chan {
      let adc : Vec<u16> = (0..NCELLS).map(|_| rng.gen::<u16>()).collect();
      capture.add_channel(ch, adc);
    }
    capture
  }
}

/// Calibrated waveform of a single channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelTrace {
  pub channel     : u8,
  /// time of each sample (ns)
  pub nanoseconds : Vec<f64>,
  /// voltage of each sample (V)
  pub voltages    : Vec<f64>,
}

impl fmt::Display for ChannelTrace {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let t_last = self.nanoseconds.last().copied().unwrap_or(0.0);
    write!(f, "<ChannelTrace: ch {}, {} samples, t0 {:.3} ns, t_last {:.3} ns>",
           self.channel,
           self.voltages.len(),
           self.nanoseconds.first().copied().unwrap_or(0.0),
           t_last)
  }
}

/// The final product of the decoding chain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedEvent {
  meta         : EventMetadata,
  trigger_cell : u16,
  traces       : Vec<ChannelTrace>,
}

impl DecodedEvent {
  
  pub(crate) fn new(meta : EventMetadata, trigger_cell : u16, traces : Vec<ChannelTrace>) -> Self {
    Self {
      meta,
      trigger_cell,
      traces,
    }
  }

  pub fn meta(&self) -> &EventMetadata {
    &self.meta
  }

  pub fn trigger_cell(&self) -> u16 {
    self.trigger_cell
  }

  pub fn traces(&self) -> &[ChannelTrace] {
    &self.traces
  }

  pub fn get_trace(&self, channel : u8) -> Option<&ChannelTrace> {
    self.traces.iter().find(|t| t.channel == channel)
  }

  pub fn get_nchan(&self) -> usize {
    self.traces.len()
  }
}

impl fmt::Display for DecodedEvent {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = format!("<DecodedEvent: event {}, board #{}, trigger cell {}",
                           self.meta.event_id,
                           self.meta.board_serial,
                           self.trigger_cell);
    if let Some(ts) = self.meta.timestamp {
      repr += &(format!("\n  timestamp {}", ts));
    }
    for tr in &self.traces {
      repr += &(format!("\n  {}", tr));
    }
    repr += ">";
    write!(f, "{}", repr)
  }
}
