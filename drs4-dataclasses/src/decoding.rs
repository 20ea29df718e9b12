//! The waveform decoding chain
//!
//! Raw adc codes and trigger cell in, time aligned 
//! voltage traces out. All functions here are pure,
//! the `Decoder` only holds read-only state, so the
//! same decoder can be used from multiple threads.

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Deserialize};

use crate::constants::{NCELLS,
                       ADC_FULL_SCALE,
                       ADC_HALF_SCALE};
use crate::errors::DecodingError;
use crate::calibrations::{CalibrationTable,
                          reconstruct};
use crate::events::{Capture,
                    RawChannel,
                    ChannelTrace,
                    DecodedEvent};

/// Conversion of adc codes to volts
///
/// voltage = adc / full_scale - offset
///
/// The range is a setting of the board, the default
/// is the -0.5..+0.5 V range of the 16bit codes.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct VoltageRange {
  pub full_scale : f64,
  pub offset     : f64,
}

impl VoltageRange {
  pub fn new() -> Self {
    Self {
      full_scale : ADC_FULL_SCALE,
      offset     : ADC_HALF_SCALE,
    }
  }

  /// The input range of the board is given by 
  /// its center, e.g. 0 for -0.5..0.5V and 0.5 
  /// for 0..1V
  pub fn from_center(center : f64) -> Self {
    Self {
      full_scale : ADC_FULL_SCALE,
      offset     : ADC_HALF_SCALE - center,
    }
  }

  pub fn to_volts(&self, adc : u16) -> f64 {
    adc as f64 / self.full_scale - self.offset
  }
}

impl Default for VoltageRange {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for VoltageRange {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<VoltageRange: {:.3}V..{:.3}V>", -self.offset, 1.0 - self.offset)
  }
}

/// Converts the adc codes of a single channel
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ChannelDecoder {
  pub range : VoltageRange,
}

impl ChannelDecoder {
  
  pub fn new(range : VoltageRange) -> Self {
    Self {
      range
    }
  }

  /// No clamping, every 16bit code maps to a voltage
  pub fn voltages(&self, adc : &[u16]) -> Vec<f64> {
    adc.iter().map(|a| self.range.to_volts(*a)).collect()
  }

  /// Pair the voltages with the time axis of 
  /// the channel
  ///
  /// # Arguments
  ///
  /// * channel : channel id
  /// * adc     : raw codes, one per cell 
  /// * times   : reconstructed times, one per cell
  pub fn decode(&self, channel : u8, adc : &[u16], times : Vec<f64>) 
    -> Result<ChannelTrace, DecodingError> {
    if adc.len() != times.len() {
      error!("Channel {} has {} adc values, but {} time bins!", channel, adc.len(), times.len());
      return Err(DecodingError::WrongNumberOfCells);
    }
    Ok(ChannelTrace {
      channel,
      nanoseconds : times,
      voltages    : self.voltages(adc),
    })
  }
}

impl Default for ChannelDecoder {
  fn default() -> Self {
    Self::new(VoltageRange::new())
  }
}

/// Put all traces on the time base of the 
/// reference channel (the lowest channel id)
///
/// The cell with index (ncells - trigger_cell) % ncells 
/// will have the same time in all channels afterwards.
/// The reference trace is not modified, and for less
/// than two traces this does nothing.
pub fn align(traces : &mut [ChannelTrace], trigger_cell : usize) {
  if traces.len() < 2 {
    return;
  }
  let mut ref_idx = 0usize;
  for (k, tr) in traces.iter().enumerate() {
    if tr.channel < traces[ref_idx].channel {
      ref_idx = k;
    }
  }
  let ncells = traces[ref_idx].nanoseconds.len();
  if ncells == 0 {
    return;
  }
  let anchor     = (ncells - trigger_cell % ncells) % ncells;
  let ref_anchor = traces[ref_idx].nanoseconds[anchor];
  for (k, tr) in traces.iter_mut().enumerate() {
    if k == ref_idx {
      continue;
    }
    if tr.nanoseconds.len() != ncells {
      warn!("Channel {} has {} time bins, the reference has {}. Not aligning!", tr.channel, tr.nanoseconds.len(), ncells);
      continue;
    }
    let delta = ref_anchor - tr.nanoseconds[anchor];
    for t in tr.nanoseconds.iter_mut() {
      *t += delta;
    }
  }
}

/// Combine the decoded traces with the capture 
/// information
pub fn assemble(capture : &Capture, traces : Vec<ChannelTrace>) -> DecodedEvent {
  DecodedEvent::new(capture.meta.clone(), capture.trigger_cell, traces)
}

/// What to do if a channel in the data has never 
/// been calibrated
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum MissingCalibrationPolicy {
  /// Do not decode the event at all
  AbortEvent,
  /// Look up the channel in a previously loaded 
  /// default table. If it is not there either, 
  /// the event is aborted.
  UseFallback,
}

impl fmt::Display for MissingCalibrationPolicy {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      MissingCalibrationPolicy::AbortEvent  => "AbortEvent",
      MissingCalibrationPolicy::UseFallback => "UseFallback",
    };
    write!(f, "<MissingCalibrationPolicy: {}>", repr)
  }
}

/// Decodes full captures
///
/// Per channel time reconstruction and voltage 
/// conversion, then alignment and assembly.
#[derive(Debug, Clone)]
pub struct Decoder {
  calibration     : Arc<CalibrationTable>,
  fallback        : Option<Arc<CalibrationTable>>,
  pub policy      : MissingCalibrationPolicy,
  channel_decoder : ChannelDecoder,
  /// Switch off to get the raw, trigger cell relative
  /// time axes
  pub align       : bool,
}

impl Decoder {

  pub fn new(calibration : Arc<CalibrationTable>, range : VoltageRange) -> Self {
    Self {
      calibration,
      fallback        : None,
      policy          : MissingCalibrationPolicy::AbortEvent,
      channel_decoder : ChannelDecoder::new(range),
      align           : true,
    }
  }

  /// Use a default table for channels which are 
  /// missing in the primary one
  pub fn with_fallback(mut self, fallback : Arc<CalibrationTable>) -> Self {
    self.fallback = Some(fallback);
    self.policy   = MissingCalibrationPolicy::UseFallback;
    self
  }

  pub fn calibration(&self) -> &CalibrationTable {
    &self.calibration
  }

  pub fn range(&self) -> VoltageRange {
    self.channel_decoder.range
  }

  fn widths(&self, channel : u8) -> Result<&[f32;NCELLS], DecodingError> {
    match self.calibration.widths(channel) {
      Err(DecodingError::CalibrationMissing {channel}) => {
        if self.policy == MissingCalibrationPolicy::UseFallback {
          if let Some(fallback) = &self.fallback {
            debug!("Using fallback calibration for channel {}", channel);
            return fallback.widths(channel);
          }
        }
        Err(DecodingError::CalibrationMissing {channel})
      }
      other => other
    }
  }

  /// Decode a single channel without alignment
  pub fn decode_channel(&self, raw : &RawChannel, trigger_cell : usize) 
    -> Result<ChannelTrace, DecodingError> {
    if raw.adc.len() != NCELLS {
      error!("Channel {} has {} adc values, expected {}!", raw.channel, raw.adc.len(), NCELLS);
      return Err(DecodingError::WrongNumberOfCells);
    }
    let times = reconstruct(self.widths(raw.channel)?, trigger_cell);
    self.channel_decoder.decode(raw.channel, &raw.adc, times)
  }

  /// Run the full chain for one capture
  ///
  /// Fails if any of the channels can not be 
  /// decoded - there are no partial events.
  pub fn decode(&self, capture : &Capture) -> Result<DecodedEvent, DecodingError> {
    let trigger_cell = capture.trigger_cell as usize;
    if trigger_cell >= NCELLS {
      error!("Trigger cell {} out of range for event {}!", trigger_cell, capture.meta.event_id);
      return Err(DecodingError::TriggerCellOutOfRange);
    }
    let mut traces = Vec::<ChannelTrace>::with_capacity(capture.channels.len());
    for raw in &capture.channels {
      traces.push(self.decode_channel(raw, trigger_cell)?);
    }
    if self.align {
      align(&mut traces, trigger_cell);
    }
    trace!("Decoded {}", capture);
    Ok(assemble(capture, traces))
  }
}

impl fmt::Display for Decoder {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = format!("<Decoder:\n  {}\n  {}\n  {}", self.calibration, self.channel_decoder.range, self.policy);
    if let Some(fb) = &self.fallback {
      repr += &(format!("\n  fallback {}", fb));
    }
    repr += &(format!("\n  align {}>", self.align));
    write!(f, "{}", repr)
  }
}
