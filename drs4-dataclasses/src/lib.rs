//! DRS4 dataclasses
//!
//! Data containers and the waveform decoding chain for the 
//! DRS4 switched capacitor array. The DRS4 samples into a
//! circular array of 1024 capacitors. When a trigger arrives,
//! the sampling stops and the cell which was written last 
//! (the trigger cell) defines the start of the readout. 
//! Since each cell has its own (calibrated) time width, the 
//! time axis of every waveform has to be reconstructed
//! for each event.
//!
//! The chain is 
//!
//! * `CalibrationTable`  - per channel time bin widths
//! * `reconstruct`       - cumulative time axis starting at the trigger cell
//! * `ChannelDecoder`    - adc codes to voltages
//! * `align`             - common time base for all channels 
//! * `assemble`          - build the final `DecodedEvent`
//!
//! `Decoder` wires all of the above together.
//!
//! * features: "random" - provides "::from_random" for captures and 
//!   calibration tables, allowing to populate them with random data for tests.

#[macro_use] extern crate log;

pub mod constants;
pub mod errors;
pub mod serialization;
pub mod calibrations;
pub mod decoding;
pub mod events;
pub mod io;

#[cfg(feature = "random")]
pub trait FromRandom {
  fn from_random() -> Self;
}

pub use crate::calibrations::{CalibrationTable,
                              reconstruct};
pub use crate::decoding::{VoltageRange,
                          ChannelDecoder,
                          MissingCalibrationPolicy,
                          Decoder,
                          align,
                          assemble};
pub use crate::events::{Capture,
                        RawChannel,
                        ChannelTrace,
                        EventMetadata,
                        DecodedEvent};
