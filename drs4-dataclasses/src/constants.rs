//! Global constants for DRS4 operations
//!

/// Number of cells in the circular capacitor array
/// of a single DRS4 channel
pub const NCELLS    : usize = 1024;

/// Maximum number of channels we can hold calibration 
/// data for. The evaluation board exposes 4 inputs, 
/// the chip itself has 8 (+1 clock) channels.
pub const NCHN      : usize = 8;

/// Number of inputs on the evaluation board
pub const N_INPUTS  : usize = 4;

/// 16bit adc codes span this many counts
pub const ADC_FULL_SCALE : f64 = 65536.0;

/// The adc codes are centered at mid-range.
/// For the -0.5..0.5V input range, this has
/// to be subtracted after normalization
pub const ADC_HALF_SCALE : f64 = 0.5;

/// The base character for the digit in channel
/// tags, e.g. "C001" -> channel 1
pub const CHANNEL_TAG_BASE : u8 = b'0';
