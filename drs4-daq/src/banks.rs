//! Bank format of the published events
//!
//! Every slot in the event ring holds one event:
//!
//! ```text
//! event header   event id    u16
//!                trigger msk u16
//!                serial      u32
//!                timestamp   u32
//!                data size   u32  (bank header + all banks)
//! bank header    banks size  u32  (all banks)
//!                flags       u32
//! bank           name        4 bytes, e.g. "TC00"
//!                type        u32
//!                data size   u32  (without padding)
//!                data        padded to 8 bytes
//! ```
//!
//! All numbers are little endian. For each decoded 
//! channel there is a time bank (TCxx, ns) and a 
//! voltage bank (CCxx, mV), both 32bit floats. The 
//! index xx is the 0-based front panel input.

use std::fmt;

use drs4_dataclasses::DecodedEvent;
use drs4_dataclasses::errors::SerializationError;
use drs4_dataclasses::serialization::{
    parse_u16,
    parse_u32,
};

/// Type id of 32bit float banks
pub const TID_FLOAT      : u32 = 9;
/// Flags of the bank header for 32bit banks
pub const BANK_FLAGS     : u32 = 0x31;
pub const TIME_PREFIX    : &str = "TC";
pub const VOLTAGE_PREFIX : &str = "CC";

/// Name of the bank for a 0-based input
pub fn bank_name(prefix : &str, index : u8) -> [u8;4] {
  let name = format!("{}{:02}", prefix, index);
  let mut bytes = [b' ';4];
  for (k, b) in name.bytes().take(4).enumerate() {
    bytes[k] = b;
  }
  bytes
}

fn padded(size : usize) -> usize {
  (size + 7) & !7
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EventHeader {
  pub event_id      : u16,
  pub trigger_mask  : u16,
  pub serial_number : u32,
  pub time_stamp    : u32,
  pub data_size     : u32,
}

impl EventHeader {
  pub const SIZE : usize = 16;

  pub fn new(event_id : u16, trigger_mask : u16, serial_number : u32, time_stamp : u32) -> Self {
    Self {
      event_id,
      trigger_mask,
      serial_number,
      time_stamp,
      data_size : 0,
    }
  }
}

/// A single named data block
#[derive(Debug, Clone, PartialEq)]
pub struct Bank {
  pub name    : [u8;4],
  pub type_id : u32,
  pub data    : Vec<u8>,
}

impl Bank {
  pub const HEADER_SIZE : usize = 12;

  pub fn from_f32(name : [u8;4], values : &[f32]) -> Self {
    let mut data = Vec::<u8>::with_capacity(values.len()*4);
    for v in values {
      data.extend_from_slice(&v.to_le_bytes());
    }
    Self {
      name,
      type_id : TID_FLOAT,
      data,
    }
  }

  pub fn get_name(&self) -> String {
    String::from_utf8_lossy(&self.name).to_string()
  }

  /// The bank content as 32bit floats. Empty if 
  /// the bank is not a float bank.
  pub fn as_f32(&self) -> Vec<f32> {
    if self.type_id != TID_FLOAT {
      return Vec::<f32>::new();
    }
    self.data.chunks_exact(4)
      .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect()
  }

  /// Space the bank takes in the event, including 
  /// header and padding
  pub fn size(&self) -> usize {
    Self::HEADER_SIZE + padded(self.data.len())
  }
}

/// Event as it goes through the ring
#[derive(Debug, Clone, PartialEq)]
pub struct BankEvent {
  pub header : EventHeader,
  pub banks  : Vec<Bank>,
}

impl BankEvent {

  pub fn new(header : EventHeader) -> Self {
    Self {
      header,
      banks : Vec::<Bank>::new(),
    }
  }

  /// Time and voltage banks for all traces of 
  /// a decoded event. Channels are 1-based, the
  /// bank index is the 0-based input.
  pub fn from_decoded(header : EventHeader, event : &DecodedEvent) -> Self {
    let mut bank_event = Self::new(header);
    let mut times    = Vec::<Bank>::with_capacity(event.get_nchan());
    let mut voltages = Vec::<Bank>::with_capacity(event.get_nchan());
    for tr in event.traces() {
      let index = tr.channel.saturating_sub(1);
      let ns : Vec<f32> = tr.nanoseconds.iter().map(|t| *t as f32).collect();
      let mv : Vec<f32> = tr.voltages.iter().map(|v| (*v*1000.0) as f32).collect();
      times.push(Bank::from_f32(bank_name(TIME_PREFIX, index), &ns));
      voltages.push(Bank::from_f32(bank_name(VOLTAGE_PREFIX, index), &mv));
    }
    bank_event.banks.extend(times);
    bank_event.banks.extend(voltages);
    bank_event
  }

  pub fn get_bank(&self, name : &str) -> Option<&Bank> {
    self.banks.iter().find(|b| b.name == name.as_bytes())
  }

  /// Size of bank header and banks
  pub fn data_size(&self) -> usize {
    8 + self.banks.iter().map(|b| b.size()).sum::<usize>()
  }

  /// Serialize into an (empty) ring slot
  pub fn write_into(&self, slot : &mut Vec<u8>) {
    slot.clear();
    let data_size = self.data_size();
    slot.reserve(EventHeader::SIZE + data_size);
    slot.extend_from_slice(&self.header.event_id.to_le_bytes());
    slot.extend_from_slice(&self.header.trigger_mask.to_le_bytes());
    slot.extend_from_slice(&self.header.serial_number.to_le_bytes());
    slot.extend_from_slice(&self.header.time_stamp.to_le_bytes());
    slot.extend_from_slice(&(data_size as u32).to_le_bytes());
    slot.extend_from_slice(&((data_size - 8) as u32).to_le_bytes());
    slot.extend_from_slice(&BANK_FLAGS.to_le_bytes());
    for b in &self.banks {
      slot.extend_from_slice(&b.name);
      slot.extend_from_slice(&b.type_id.to_le_bytes());
      slot.extend_from_slice(&(b.data.len() as u32).to_le_bytes());
      slot.extend_from_slice(&b.data);
      slot.resize(slot.len() + padded(b.data.len()) - b.data.len(), 0);
    }
  }

  pub fn to_bytestream(&self) -> Vec<u8> {
    let mut stream = Vec::<u8>::new();
    self.write_into(&mut stream);
    stream
  }

  pub fn from_bytestream(stream : &[u8]) -> Result<Self, SerializationError> {
    if stream.len() < EventHeader::SIZE + 8 {
      return Err(SerializationError::StreamTooShort);
    }
    let mut pos = 0usize;
    let mut header = EventHeader::new(0,0,0,0);
    header.event_id      = parse_u16(stream, &mut pos);
    header.trigger_mask  = parse_u16(stream, &mut pos);
    header.serial_number = parse_u32(stream, &mut pos);
    header.time_stamp    = parse_u32(stream, &mut pos);
    header.data_size     = parse_u32(stream, &mut pos);
    let end = EventHeader::SIZE + header.data_size as usize;
    if stream.len() < end {
      error!("Event claims {} bytes, but only {} are there!", end, stream.len());
      return Err(SerializationError::StreamTooShort);
    }
    let banks_size = parse_u32(stream, &mut pos) as usize;
    let flags      = parse_u32(stream, &mut pos);
    if flags != BANK_FLAGS || banks_size + 8 != header.data_size as usize {
      error!("Unexpected bank header, flags {:x}, size {}!", flags, banks_size);
      return Err(SerializationError::HeadInvalid);
    }
    let mut event = Self::new(header);
    while pos + Bank::HEADER_SIZE <= end {
      let name = [stream[pos], stream[pos+1], stream[pos+2], stream[pos+3]];
      pos += 4;
      let type_id = parse_u32(stream, &mut pos);
      let size    = parse_u32(stream, &mut pos) as usize;
      if pos + size > end {
        error!("Bank {} with {} bytes exceeds the event!", String::from_utf8_lossy(&name), size);
        return Err(SerializationError::WrongByteSize);
      }
      event.banks.push(Bank {
        name,
        type_id,
        data : stream[pos..pos+size].to_vec(),
      });
      pos += padded(size);
    }
    Ok(event)
  }
}

impl fmt::Display for BankEvent {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let names : Vec<String> = self.banks.iter().map(|b| b.get_name()).collect();
    write!(f, "<BankEvent: id {}, serial {}, {} bytes, banks {:?}>",
           self.header.event_id,
           self.header.serial_number,
           self.data_size(),
           names)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn names() {
    assert_eq!(&bank_name(TIME_PREFIX, 0), b"TC00");
    assert_eq!(&bank_name(VOLTAGE_PREFIX, 3), b"CC03");
  }

  #[test]
  fn banks_are_aligned() {
    let mut event = BankEvent::new(EventHeader::new(666, 0, 1, 0));
    event.banks.push(Bank::from_f32(*b"TC00", &[1.0, 2.0, 3.0]));
    event.banks.push(Bank::from_f32(*b"CC00", &[-1.5]));
    let stream = event.to_bytestream();
    // 16 + 8 + (12 + 16) + (12 + 8)
    assert_eq!(stream.len(), 72);
    assert_eq!(u32::from_le_bytes([stream[12], stream[13], stream[14], stream[15]]), 56);
    let mut recovered = BankEvent::from_bytestream(&stream).unwrap();
    assert_eq!(recovered.header.data_size, 56);
    recovered.header.data_size = 0;
    assert_eq!(recovered, event);
    assert_eq!(recovered.get_bank("CC00").unwrap().as_f32(), vec![-1.5]);
  }

  #[test]
  fn truncated_event() {
    let mut event = BankEvent::new(EventHeader::new(666, 0, 1, 0));
    event.banks.push(Bank::from_f32(*b"TC00", &[1.0; 10]));
    let stream = event.to_bytestream();
    assert_eq!(BankEvent::from_bytestream(&stream[0..stream.len()-4]), 
               Err(SerializationError::StreamTooShort));
    assert_eq!(BankEvent::from_bytestream(&stream[0..10]), 
               Err(SerializationError::StreamTooShort));
  }
}
