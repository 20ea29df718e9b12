/// Settings for the DRS4 frontend
///
/// Everything which was hardcoded in the 
/// board setup and the readout loop can be 
/// changed in a .toml config file
///

use std::fs::File;
use std::io::{
    Write,
    Read,
};
use std::fmt;

extern crate toml;
use drs4_dataclasses::errors::SerializationError;
use drs4_dataclasses::decoding::MissingCalibrationPolicy;

/// Configuration of the evaluation board itself
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoardSettings {
  /// Sampling speed of the domino wave (GHz)
  pub sampling_frequency     : f64,
  /// Centre of the input range (V). The board 
  /// covers centre +- 0.5 V
  pub input_range_center     : f64,
  /// Route the inputs through the chip while 
  /// it is not sampling
  pub transparent_mode       : bool,
  /// Front panel input (0-3) used as trigger 
  pub trigger_source         : u8,
  /// Trigger threshold (V)
  pub trigger_level          : f64,
  /// Trigger on the falling edge
  pub trigger_negative       : bool,
  /// Delay of the trigger (ns)
  pub trigger_delay          : f64,
}

impl BoardSettings {
  pub fn new() -> Self {
    Self {
      sampling_frequency : 5.0,
      input_range_center : 0.0,
      transparent_mode   : true,
      trigger_source     : 0,
      trigger_level      : 0.025,
      trigger_negative   : false,
      trigger_delay      : 0.0,
    }
  }
}

impl Default for BoardSettings {
  fn default() -> Self {
    Self::new()
  }
}

/// Configuration of the readout loop
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReadoutSettings {
  /// Front panel inputs (0-3) which are read out
  pub active_inputs          : Vec<u8>,
  /// Number of slots in the event ring
  pub n_slots                : usize,
  /// Size of the slots in the event ring (bytes)
  pub slot_size              : usize,
  /// Wait at most this long for a free slot
  pub queue_timeout_ms       : u64,
  /// Sleep when the run is not active or the 
  /// ring is full
  pub idle_sleep_ms          : u64,
  /// Give up waiting for the board to finish a 
  /// capture. Waits forever if not set.
  pub busy_timeout_ms        : Option<u64>,
  pub missing_calibration    : MissingCalibrationPolicy,
  /// Table to use for channels the board did not 
  /// deliver a calibration for
  pub fallback_calibration   : Option<String>,
  /// Event id of the published events 
  pub event_id               : u16,
  pub trigger_mask           : u16,
  /// Print every decoded waveform to stdout
  pub dump_waveforms         : bool,
  /// Keep a copy of the raw captures in this file
  pub record_file            : Option<String>,
}

impl ReadoutSettings {
  pub fn new() -> Self {
    Self {
      active_inputs        : vec![0,1],
      n_slots              : 64,
      slot_size            : 100000,
      queue_timeout_ms     : 10,
      idle_sleep_ms        : 10,
      busy_timeout_ms      : None,
      missing_calibration  : MissingCalibrationPolicy::AbortEvent,
      fallback_calibration : None,
      event_id             : 666,
      trigger_mask         : 0,
      dump_waveforms       : false,
      record_file          : None,
    }
  }
}

impl Default for ReadoutSettings {
  fn default() -> Self {
    Self::new()
  }
}

/// Complete configuration of the frontend
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DaqSettings {
  pub board   : BoardSettings,
  pub readout : ReadoutSettings,
}

impl DaqSettings {
  pub fn new() -> Self {
    Self {
      board   : BoardSettings::new(),
      readout : ReadoutSettings::new(),
    }
  }

  /// Write the settings to a toml file
  pub fn to_toml(&self, mut filename : String) {
    if !filename.ends_with(".toml") {
      filename += ".toml";
    }
    info!("Will write to file {}!", filename);
    match File::create(&filename) {
      Err(err) => {
        error!("Unable to open file {}! {}", filename, err);
      }
      Ok(mut file) => {
        match toml::to_string_pretty(&self) {
          Err(err) => {
            error!("Unable to serialize toml! {err}");
          }
          Ok(toml_string) => {
            match file.write_all(toml_string.as_bytes()) {
              Err(err) => error!("Unable to write to file {}! {}", filename, err),
              Ok(_)    => debug!("Wrote settings to {}!", filename)
            }
          }
        }
      }
    }
  }

  /// Write the settings to a json file
  pub fn to_json(&self, mut filename : String) {
    if !filename.ends_with(".json") {
      filename += ".json";
    }
    info!("Will write to file {}!", filename);
    match File::create(&filename) {
      Err(err) => {
        error!("Unable to open file {}! {}", filename, err);
      }
      Ok(file) => {
        match serde_json::to_writer_pretty(file, &self) {
          Err(err) => {
            error!("Unable to serialize json! {err}");
          }
          Ok(_) => debug!("Wrote settings to {}!", filename)
        }
      }
    }
  }

  pub fn from_toml(filename : String) -> Result<DaqSettings, SerializationError> {
    let mut toml_string = String::from("");
    match File::open(&filename) {
      Err(err) => {
        error!("Unable to open {}! {}", filename, err);
        return Err(SerializationError::TomlDecodingError);
      }
      Ok(mut file) => {
        if let Err(err) = file.read_to_string(&mut toml_string) {
          error!("Unable to read {}! {}", filename, err);
          return Err(SerializationError::TomlDecodingError);
        }
      }
    }
    Self::from_toml_str(&toml_string)
  }
  
  pub fn from_toml_str(toml_string : &str) -> Result<DaqSettings, SerializationError> {
    match toml::from_str(toml_string) {
      Err(err) => {
        error!("Can't interpret toml! {}", err);
        Err(SerializationError::TomlDecodingError)
      }
      Ok(settings) => Ok(settings)
    }
  }

  pub fn from_json(filename : String) -> Result<DaqSettings, SerializationError> {
    let mut json_string = String::from("");
    match File::open(&filename) {
      Err(err) => {
        error!("Unable to open {}! {}", filename, err);
        return Err(SerializationError::JsonDecodingError);
      }
      Ok(mut file) => {
        if let Err(err) = file.read_to_string(&mut json_string) {
          error!("Unable to read {}! {}", filename, err);
          return Err(SerializationError::JsonDecodingError);
        }
      }
    }
    Self::from_json_str(&json_string)
  }

  pub fn from_json_str(json_string : &str) -> Result<DaqSettings, SerializationError> {
    match serde_json::from_str(json_string) {
      Err(err) => {
        error!("Can't interpret json! {}", err);
        Err(SerializationError::JsonDecodingError)
      }
      Ok(settings) => Ok(settings)
    }
  }
}

impl fmt::Display for DaqSettings {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let disp = toml::to_string(self).unwrap_or(
      String::from("-- DESERIALIZATION ERROR! --"));
    write!(f, "<DaqSettings :\n{}>", disp)
  }
}

impl Default for DaqSettings {
  fn default() -> Self {
    DaqSettings::new()
  }
}
