//! Error types for decoding and i/o
//!

use std::error::Error;
use std::fmt;

/// Problems which prevent a capture from being
/// decoded.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum DecodingError {
  /// No calibration block has been loaded for this 
  /// (1-based) channel 
  CalibrationMissing { channel : u8 },
  ChannelOutOfRange,
  TriggerCellOutOfRange,
  WrongNumberOfCells,
}

impl fmt::Display for DecodingError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      DecodingError::CalibrationMissing {channel} => format!("CalibrationMissing (channel {})", channel),
      DecodingError::ChannelOutOfRange            => String::from("ChannelOutOfRange"),
      DecodingError::TriggerCellOutOfRange        => String::from("TriggerCellOutOfRange"),
      DecodingError::WrongNumberOfCells           => String::from("WrongNumberOfCells"),
    };
    write!(f, "<DecodingError : {}>", repr)
  }
}

impl Error for DecodingError {
}

/// Results of an explicit validation of 
/// the calibration constants
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum CalibrationError {
  NonPositiveBinWidth { channel : u8, cell : usize },
  NonFiniteBinWidth   { channel : u8, cell : usize },
}

impl fmt::Display for CalibrationError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      CalibrationError::NonPositiveBinWidth {channel, cell} 
        => format!("NonPositiveBinWidth (channel {}, cell {})", channel, cell),
      CalibrationError::NonFiniteBinWidth {channel, cell} 
        => format!("NonFiniteBinWidth (channel {}, cell {})", channel, cell),
    };
    write!(f, "<CalibrationError : {}>", repr)
  }
}

impl Error for CalibrationError {
}

/// Issues when reading binary capture files
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ReaderError {
  FileNotFound,
  /// The stream ended in the middle of a record 
  ShortRead,
  /// The stream ended where a record was expected
  UnexpectedEOF,
  /// The file does not start with a time header
  InvalidHeader,
  IoError,
}

impl fmt::Display for ReaderError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      ReaderError::FileNotFound  => "FileNotFound",
      ReaderError::ShortRead     => "ShortRead",
      ReaderError::UnexpectedEOF => "UnexpectedEOF",
      ReaderError::InvalidHeader => "InvalidHeader",
      ReaderError::IoError       => "IoError",
    };
    write!(f, "<ReaderError : {}>", repr)
  }
}

impl Error for ReaderError {
}

/// Indicate issues with (de)serialization
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SerializationError {
  TailInvalid,
  HeadInvalid,
  StreamTooShort,
  WrongByteSize,
  JsonDecodingError,
  TomlDecodingError,
}

impl fmt::Display for SerializationError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      SerializationError::TailInvalid       => "TailInvalid",
      SerializationError::HeadInvalid       => "HeadInvalid",
      SerializationError::StreamTooShort    => "StreamTooShort",
      SerializationError::WrongByteSize     => "WrongByteSize",
      SerializationError::JsonDecodingError => "JsonDecodingError",
      SerializationError::TomlDecodingError => "TomlDecodingError",
    };
    write!(f, "<Serialization Error : {}>", repr)
  }
}

impl Error for SerializationError {
}
