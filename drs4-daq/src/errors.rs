//! Errors of the live readout
//!

use std::error::Error;
use std::fmt;

use drs4_dataclasses::errors::DecodingError;

/// Failures when handing event slots between 
/// the driver and the data sink
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum QueueError {
  /// No slot became available in time. 
  /// Transient, the caller is expected to retry.
  Timeout,
  /// The other end of the ring is gone
  Disconnected,
}

impl fmt::Display for QueueError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      QueueError::Timeout      => "Timeout",
      QueueError::Disconnected => "Disconnected",
    };
    write!(f, "<QueueError : {}>", repr)
  }
}

impl Error for QueueError {
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum BoardError {
  NoBoardFound,
  /// The board did not finish the capture within 
  /// the configured time
  BusyTimeout,
  ChannelUnavailable,
  /// Anything the board reports back as failure
  Hardware,
}

impl fmt::Display for BoardError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      BoardError::NoBoardFound       => "NoBoardFound",
      BoardError::BusyTimeout        => "BusyTimeout",
      BoardError::ChannelUnavailable => "ChannelUnavailable",
      BoardError::Hardware           => "Hardware",
    };
    write!(f, "<BoardError : {}>", repr)
  }
}

impl Error for BoardError {
}

/// Errors which halt the acquisition driver
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum DriverError {
  Queue(QueueError),
  Board(BoardError),
  /// The calibration could not be obtained 
  /// from the board
  Calibration(DecodingError),
}

impl fmt::Display for DriverError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      DriverError::Queue(err)       => format!("Queue {}", err),
      DriverError::Board(err)       => format!("Board {}", err),
      DriverError::Calibration(err) => format!("Calibration {}", err),
    };
    write!(f, "<DriverError : {}>", repr)
  }
}

impl Error for DriverError {
}

impl From<QueueError> for DriverError {
  fn from(err : QueueError) -> Self {
    DriverError::Queue(err)
  }
}

impl From<BoardError> for DriverError {
  fn from(err : BoardError) -> Self {
    DriverError::Board(err)
  }
}

impl From<DecodingError> for DriverError {
  fn from(err : DecodingError) -> Self {
    DriverError::Calibration(err)
  }
}
