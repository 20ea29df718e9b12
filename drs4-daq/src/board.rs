//! Access to the DRS4 evaluation board
//!
//! The board has 4 front panel inputs, which are 
//! wired to every second channel of the DRS4 chip 
//! (input k is read from chip channel 2k). All 
//! methods taking a channel expect the chip channel.
//!
//! The vendor driver is not part of this crate, 
//! the readout works against the `Board` trait. 
//! `SimulatedBoard` produces pulses on the trigger
//! input and noise on all others.

use std::fmt;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use drs4_dataclasses::constants::{
    NCELLS,
    N_INPUTS,
};
use drs4_dataclasses::decoding::VoltageRange;

use crate::errors::BoardError;
use crate::settings::BoardSettings;

/// Number of channels on the chip
pub const N_CHIP_CHANNELS : u8 = 8;

/// The chip channel a front panel input (0-3) 
/// is connected to
pub fn chip_channel(input : u8) -> u8 {
  2*input
}

/// Operations of a DRS4 board needed by the 
/// readout
pub trait Board {
  fn serial_number(&self) -> u16;
  fn firmware_version(&self) -> u32;
  /// Apply frequency, input range, transparent
  /// mode and trigger configuration
  fn configure(&mut self, settings : &BoardSettings) -> Result<(), BoardError>;
  fn input_range(&self) -> VoltageRange;
  /// Arm the domino wave and wait for the trigger
  fn start_domino(&mut self) -> Result<(), BoardError>;
  /// True while the board is still sampling or 
  /// waiting for a trigger
  fn is_busy(&mut self) -> Result<bool, BoardError>;
  /// Move the sampled data of all channels into 
  /// the readout buffer
  fn transfer_waves(&mut self) -> Result<(), BoardError>;
  /// Stop cell of the last transferred capture
  fn trigger_cell(&self) -> u16;
  /// Adc codes of the last transferred capture, 
  /// in cell order starting at the trigger cell
  fn raw_waveform(&self, chip_channel : u8) -> Result<Vec<u16>, BoardError>;
  /// Effective width of each physical cell (ns)
  fn bin_widths(&self, chip_channel : u8) -> Result<Vec<f32>, BoardError>;
  /// Trigger rate counter of a front panel input
  fn scaler(&self, input : u8) -> Result<u32, BoardError>;
}

/// Find the connected board
///
/// Hardware access goes through the vendor 
/// driver, which is not linked here, so this
/// only ever finds a simulated board.
pub fn open_board(simulate : bool) -> Result<SimulatedBoard, BoardError> {
  if simulate {
    let board = SimulatedBoard::new(2901);
    info!("Found simulated DRS4 evaluation board, serial #{}, firmware revision {}", 
          board.serial_number(), board.firmware_version());
    return Ok(board);
  }
  error!("No DRS4 evaluation board found!");
  Err(BoardError::NoBoardFound)
}

/// Scalers of all front panel inputs, -1 for every 
/// input if there is no board or the scaler can not 
/// be read
pub fn read_scalers<B : Board>(board : Option<&B>) -> [i64;N_INPUTS] {
  let mut scalers = [-1i64;N_INPUTS];
  if let Some(b) = board {
    for (k, s) in scalers.iter_mut().enumerate() {
      match b.scaler(k as u8) {
        Err(err) => error!("Unable to read scaler {}! {err}", k),
        Ok(val)  => *s = val as i64,
      }
    }
  }
  scalers
}

/// A board which produces waveforms from a 
/// seeded random generator
#[derive(Debug, Clone)]
pub struct SimulatedBoard {
  pub serial           : u16,
  pub firmware         : u32,
  settings             : BoardSettings,
  range                : VoltageRange,
  widths               : Vec<Vec<f32>>,
  /// Number of `is_busy` polls which report busy 
  /// after the domino wave has been started
  pub busy_polls       : usize,
  polls_left           : usize,
  /// Never finish a capture
  pub stuck            : bool,
  /// Fail every transfer
  pub broken           : bool,
  /// Trigger cells to cycle through. Random if 
  /// empty.
  pub trigger_cells    : Vec<u16>,
  /// Amplitude of the simulated pulse (V)
  pub pulse_amplitude  : f64,
  n_starts             : usize,
  current_cell         : u16,
  waves                : Vec<Vec<u16>>,
  scalers              : [u32;N_INPUTS],
  rng                  : StdRng,
}

impl SimulatedBoard {

  pub fn new(serial : u16) -> Self {
    let nominal = 1.0/BoardSettings::new().sampling_frequency as f32;
    Self {
      serial,
      firmware        : 21305,
      settings        : BoardSettings::new(),
      range           : VoltageRange::new(),
      widths          : vec![vec![nominal;NCELLS];N_CHIP_CHANNELS as usize],
      busy_polls      : 3,
      polls_left      : 0,
      stuck           : false,
      broken          : false,
      trigger_cells   : Vec::<u16>::new(),
      pulse_amplitude : 0.1,
      n_starts        : 0,
      current_cell    : 0,
      waves           : vec![Vec::<u16>::new();N_CHIP_CHANNELS as usize],
      scalers         : [0;N_INPUTS],
      rng             : StdRng::seed_from_u64(serial as u64),
    }
  }

  /// Replace the bin widths of a chip channel
  pub fn set_bin_widths(&mut self, chip_channel : u8, widths : Vec<f32>) {
    if let Some(w) = self.widths.get_mut(chip_channel as usize) {
      *w = widths;
    }
  }

  /// Pretend the board was never calibrated for 
  /// this chip channel
  pub fn remove_bin_widths(&mut self, chip_channel : u8) {
    self.set_bin_widths(chip_channel, Vec::<f32>::new());
  }

  fn simulate_waves(&mut self) {
    let trigger_chip = chip_channel(self.settings.trigger_source);
    let sign = if self.settings.trigger_negative {-1.0} else {1.0};
    for ch in 0..N_CHIP_CHANNELS {
      let mut wave = Vec::<u16>::with_capacity(NCELLS);
      let pulse_pos = NCELLS as f64/2.0 + self.rng.gen_range(-20.0f64..20.0);
      for k in 0..NCELLS {
        let mut volts : f64 = self.rng.gen_range(-0.002..0.002);
        if ch == trigger_chip {
          let dt = (k as f64 - pulse_pos)/8.0;
          volts += sign*self.pulse_amplitude*(-0.5*dt*dt).exp();
        }
        let code = (volts + self.range.offset)*self.range.full_scale;
        wave.push(code.clamp(0.0, u16::MAX as f64) as u16);
      }
      self.waves[ch as usize] = wave;
    }
  }
}

impl Board for SimulatedBoard {

  fn serial_number(&self) -> u16 {
    self.serial
  }
  
  fn firmware_version(&self) -> u32 {
    self.firmware
  }

  fn configure(&mut self, settings : &BoardSettings) -> Result<(), BoardError> {
    if settings.trigger_source as usize >= N_INPUTS {
      error!("Can not trigger on input {}, the board only has {} inputs!", settings.trigger_source, N_INPUTS);
      return Err(BoardError::ChannelUnavailable);
    }
    if settings.sampling_frequency <= 0.0 {
      error!("Sampling frequency of {} GHz is not possible!", settings.sampling_frequency);
      return Err(BoardError::Hardware);
    }
    self.settings = settings.clone();
    self.range    = VoltageRange::from_center(settings.input_range_center);
    debug!("Configured {}", self);
    Ok(())
  }

  fn input_range(&self) -> VoltageRange {
    self.range
  }

  fn start_domino(&mut self) -> Result<(), BoardError> {
    self.polls_left   = self.busy_polls;
    self.current_cell = match self.trigger_cells.len() {
      0 => self.rng.gen_range(0..NCELLS as u16),
      n => self.trigger_cells[self.n_starts % n],
    };
    self.n_starts += 1;
    Ok(())
  }

  fn is_busy(&mut self) -> Result<bool, BoardError> {
    if self.stuck {
      return Ok(true);
    }
    if self.polls_left > 0 {
      self.polls_left -= 1;
      return Ok(true);
    }
    Ok(false)
  }

  fn transfer_waves(&mut self) -> Result<(), BoardError> {
    if self.broken {
      return Err(BoardError::Hardware);
    }
    self.simulate_waves();
    let trigger = self.settings.trigger_source as usize;
    self.scalers[trigger] = self.scalers[trigger].wrapping_add(1);
    Ok(())
  }

  fn trigger_cell(&self) -> u16 {
    self.current_cell
  }

  fn raw_waveform(&self, chip_channel : u8) -> Result<Vec<u16>, BoardError> {
    match self.waves.get(chip_channel as usize) {
      None       => Err(BoardError::ChannelUnavailable),
      Some(wave) => Ok(wave.clone()),
    }
  }

  fn bin_widths(&self, chip_channel : u8) -> Result<Vec<f32>, BoardError> {
    match self.widths.get(chip_channel as usize) {
      None         => Err(BoardError::ChannelUnavailable),
      Some(widths) => Ok(widths.clone()),
    }
  }

  fn scaler(&self, input : u8) -> Result<u32, BoardError> {
    match self.scalers.get(input as usize) {
      None    => Err(BoardError::ChannelUnavailable),
      Some(s) => Ok(*s),
    }
  }
}

impl fmt::Display for SimulatedBoard {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<SimulatedBoard: serial {}, fw {}, {} GHz, {}, trigger input {} at {} V, {} captures>",
           self.serial,
           self.firmware,
           self.settings.sampling_frequency,
           self.range,
           self.settings.trigger_source,
           self.settings.trigger_level,
           self.n_starts)
  }
}
