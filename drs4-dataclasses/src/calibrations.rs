//! Timing calibration of the DRS4 cells
//!
//! Every cell of the capacitor array has its own 
//! time width ("bin width"), which varies from cell to
//! cell due to manufacturing variations. The widths 
//! are measured once per board and channel and are
//! either queried from the board itself or read from 
//! the calibration blocks at the beginning of a binary 
//! capture file.
//!
//! The `CalibrationTable` holds the results for all 
//! channels of a single board. It is loaded once and 
//! read-only afterwards, so it can be shared (e.g. 
//! through an `Arc`) by any number of decoding threads.

use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::error::Error;

use crate::constants::{NCELLS, NCHN};
use crate::errors::{DecodingError,
                    CalibrationError};
use crate::serialization::{Serialization,
                           SerializationError,
                           parse_u8,
                           parse_u16,
                           parse_f32};

#[cfg(feature = "random")] 
use crate::FromRandom;
#[cfg(feature = "random")]
use rand::Rng;

/// Reconstruct the time axis for one channel
///
/// The sampling array is circular, and the readout
/// starts at the trigger cell. The time of sample k 
/// is the sum of all bin widths of the physical cells
/// between the trigger cell and k, walking forward 
/// around the array. 
///
/// The sum is accumulated strictly left to right, 
/// the result is reproducible bit by bit.
///
/// # Arguments
///
/// * widths       : bin widths of all cells of the channel 
///                  in physical cell order
/// * trigger_cell : the cell the readout starts with
pub fn reconstruct(widths : &[f32], trigger_cell : usize) -> Vec<f64> {
  let ncells    = widths.len();
  let mut times = vec![0.0f64; ncells];
  for k in 1..ncells {
    times[k] = times[k-1] + widths[(k-1+trigger_cell) % ncells] as f64;
  }
  times
}

/// Cell widths for all channels of a single board 
///
/// Channels are 1-based, as they are in the 
/// channel tags of the binary files ("C001")
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationTable {
  pub board_serial : u16,
  /// bit n is set if channel n+1 has 
  /// been calibrated
  pub channel_mask : u8,
  /// cell width (ns)
  tbin             : Vec<[f32;NCELLS]>,
}

impl CalibrationTable {

  pub fn new(board_serial : u16) -> Self {
    Self {
      board_serial,
      channel_mask : 0,
      tbin         : vec![[0.0;NCELLS];NCHN],
    }
  }

  fn index(channel : u8) -> Result<usize, DecodingError> {
    if channel == 0 || channel as usize > NCHN {
      error!("There is no channel 0 and no channel larger than {}! Channel {} was requested.", NCHN, channel);
      return Err(DecodingError::ChannelOutOfRange);
    }
    Ok(channel as usize - 1)
  }

  /// Store the bin widths for a channel. 
  ///
  /// This is meant to be used while loading 
  /// the table. Previous values get overwritten.
  pub fn set_widths(&mut self, channel : u8, widths : &[f32]) 
    -> Result<(), DecodingError> {
    let idx = Self::index(channel)?;
    if widths.len() != NCELLS {
      error!("Got {} bin widths for channel {}, but expect {}!", widths.len(), channel, NCELLS);
      return Err(DecodingError::WrongNumberOfCells);
    }
    self.tbin[idx].copy_from_slice(widths);
    self.channel_mask |= 1 << idx;
    Ok(())
  }

  pub fn is_calibrated(&self, channel : u8) -> bool {
    match Self::index(channel) {
      Err(_)  => false,
      Ok(idx) => (self.channel_mask & (1 << idx)) > 0
    }
  }

  /// All channels with a calibration, in ascending order
  pub fn calibrated_channels(&self) -> Vec<u8> {
    (1..=NCHN as u8).filter(|ch| self.is_calibrated(*ch)).collect()
  }

  /// The bin widths of a channel in physical cell order
  ///
  /// Fails with CalibrationMissing if there never has 
  /// been a calibration block for this channel. 
  pub fn widths(&self, channel : u8) -> Result<&[f32;NCELLS], DecodingError> {
    let idx = Self::index(channel)?;
    if !self.is_calibrated(channel) {
      return Err(DecodingError::CalibrationMissing { channel });
    }
    Ok(&self.tbin[idx])
  }
  
  /// Apply the timing calibration to a single channel 
  /// 
  /// # Arguments
  ///
  /// * channel      : Channel id 1-8
  /// * trigger_cell : The cell the readout starts with
  pub fn nanoseconds(&self, channel : u8, trigger_cell : usize) 
    -> Result<Vec<f64>, DecodingError> {
    if trigger_cell >= NCELLS {
      return Err(DecodingError::TriggerCellOutOfRange);
    }
    Ok(reconstruct(self.widths(channel)?, trigger_cell))
  }

  /// Check that all widths of the calibrated channels 
  /// are finite and positive.
  ///
  /// The decoding chain does not do this by itself, 
  /// broken widths result in garbage time axes.
  pub fn validate(&self) -> Result<(), CalibrationError> {
    for ch in self.calibrated_channels() {
      let widths = &self.tbin[ch as usize - 1];
      for (cell, w) in widths.iter().enumerate() {
        if !w.is_finite() {
          return Err(CalibrationError::NonFiniteBinWidth { channel : ch, cell });
        }
        if *w <= 0.0 {
          return Err(CalibrationError::NonPositiveBinWidth { channel : ch, cell });
        }
      }
    }
    Ok(())
  }

  /// Load a table which has been written with `to_file`
  pub fn from_file(path : &Path) -> Result<Self, Box<dyn Error>> {
    debug!("Attempting to open file {}", path.display());
    let mut file   = File::open(path)?;
    let mut stream = Vec::<u8>::new();
    file.read_to_end(&mut stream)?;
    let table = Self::from_bytestream(&stream, &mut 0)?;
    info!("Loaded {} from {}", table, path.display());
    Ok(table)
  }

  pub fn to_file(&self, path : &Path) -> Result<(), Box<dyn Error>> {
    let mut file = File::create(path)?;
    file.write_all(&self.to_bytestream())?;
    info!("Wrote {} to {}", self, path.display());
    Ok(())
  }
}

impl Serialization for CalibrationTable {
  const HEAD : u16   = 0xAAAA; 
  const TAIL : u16   = 0x5555; 
  const SIZE : usize = NCHN*NCELLS*4 + 2 + 1 + 4; 
  
  fn from_bytestream(stream : &[u8], 
                     pos    : &mut usize)
    -> Result<Self, SerializationError> { 
    Self::verify_fixed(stream, pos)?;
    let mut table      = Self::new(parse_u16(stream, pos));
    table.channel_mask = parse_u8(stream, pos);
    for ch in 0..NCHN {
      for k in 0..NCELLS {
        table.tbin[ch][k] = parse_f32(stream, pos);
      }
    }
    if parse_u16(stream, pos) != Self::TAIL {
      return Err(SerializationError::TailInvalid);
    }
    Ok(table)
  }

  fn to_bytestream(&self) -> Vec<u8> {
    let mut bs = Vec::<u8>::with_capacity(Self::SIZE);
    bs.extend_from_slice(&Self::HEAD.to_le_bytes());
    bs.extend_from_slice(&self.board_serial.to_le_bytes());
    bs.push(self.channel_mask);
    for ch in 0..NCHN {
      for k in 0..NCELLS {
        bs.extend_from_slice(&self.tbin[ch][k].to_le_bytes());
      }
    }
    bs.extend_from_slice(&Self::TAIL.to_le_bytes());
    bs
  }
}

impl Default for CalibrationTable {
  fn default() -> Self {
    Self::new(0)
  }
}

impl fmt::Display for CalibrationTable {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<CalibrationTable: board #{}, channels {:?}>", self.board_serial, self.calibrated_channels())
  } 
}

#[cfg(feature = "random")]
impl FromRandom for CalibrationTable {
  
  fn from_random() -> Self {
    let mut rng   = rand::thread_rng();
    let mut table = Self::new(rng.gen::<u16>());
    let n_chan    = rng.gen_range(1..=NCHN as u8);
    for ch in 1..=n_chan {
      let widths : Vec<f32> = (0..NCELLS).map(|_| rng.gen_range(0.15..0.25)).collect();
      // can not fail, channel and length are in range 
      let _ = table.set_widths(ch, &widths);
    }
    table
  }
}
