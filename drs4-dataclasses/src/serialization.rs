//! Serialization/Deserialization helpers
//!
//! All numbers are little endian. The parse_* functions
//! do not check the length of the stream, callers have
//! to make sure that enough bytes are available.

// re-exports
pub use crate::errors::SerializationError;

/// Convert a slice of u16 into a vector of u8
///
/// The resulting vector has twice the number
/// of entries of the original vector.
/// This is useful, when serializing data 
/// represented as u16, e.g. the adc codes.
pub fn u16_to_u8(vec_u16: &[u16]) -> Vec<u8> {
    vec_u16.iter()
        .flat_map(|&n| n.to_le_bytes().to_vec())
        .collect()
}

/// Restore a vector of u16 from a slice of u8
///
/// This interpretes two following u8 as an u16
pub fn u8_to_u16(vec_u8: &[u8]) -> Vec<u16> {
    vec_u8.chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

pub fn parse_u8(bs : &[u8], pos : &mut usize) -> u8 {
  let value = u8::from_le_bytes([bs[*pos]]);
  *pos += 1;
  value
}

/// Get u16 from a bytestream and move on the position marker
///
/// # Arguments 
///
/// * bs
/// * pos 
pub fn parse_u16(bs : &[u8], pos : &mut usize) -> u16 {
  let value = u16::from_le_bytes([bs[*pos], bs[*pos+1]]);
  *pos += 2;
  value
}

pub fn parse_u32(bs : &[u8], pos : &mut usize) -> u32 {
  let value = u32::from_le_bytes([bs[*pos], bs[*pos+1], bs[*pos+2], bs[*pos+3]]);
  *pos += 4;
  value
}

pub fn parse_f32(bs : &[u8], pos : &mut usize) -> f32 {
  let value = f32::from_le_bytes([bs[*pos],   bs[*pos+1],  
                                  bs[*pos+2], bs[*pos+3]]);
  *pos += 4;
  value
}

/// Encode/decode structs to Vec::<u8> to write to a file or
/// send over the network
///
pub trait Serialization {

  const HEAD: u16;
  const TAIL: u16;
  /// The SIZE is the size of the serialized 
  /// bytestream INCLUDING 4 bytes for head
  /// and tail bytes. 
  const SIZE: usize;

  /// Decode a serializable from a bytestream  
  fn from_bytestream(bytestream : &[u8], 
                     pos        : &mut usize)
    -> Result<Self, SerializationError>
    where Self : Sized;
  
  /// Encode a serializable to a bytestream  
  fn to_bytestream(&self) -> Vec<u8>;
  
  /// Make sure the stream holds at least SIZE bytes 
  /// after pos and starts with HEAD
  fn verify_fixed(stream : &[u8], 
                  pos    : &mut usize) -> Result<(), SerializationError> {
    if stream.len() < *pos + Self::SIZE {
      error!("Seeing {} bytes, but expecting {}", stream.len().saturating_sub(*pos), Self::SIZE);
      return Err(SerializationError::StreamTooShort);
    }
    if parse_u16(stream, pos) != Self::HEAD {
      return Err(SerializationError::HeadInvalid);
    }
    Ok(())
  }
}
