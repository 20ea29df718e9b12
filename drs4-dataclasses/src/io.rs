//! Input/Output for binary capture files
//!
//! The layout (all numbers little endian) is
//!
//! * optional file version tag "DRS1"
//! * time header : "TIME", "B#", board serial (u16)
//! * 0..n calibration blocks : "C00<ch>", NCELLS x f32 bin widths 
//! * events until the end of the file:
//!   - event header : "EHDR", serial (u32), year, month, day, hour, 
//!                    minute, second, millisecond, reserved (u16 each),
//!                    "B#", board serial (u16), "T#", trigger cell (u16)
//!   - 1..n channel blocks : "C00<ch>", NCELLS x u16 adc codes
//!
//! Calibration and channel block lists end with the first tag 
//! which is not a channel tag. That tag is pushed back into the
//! stream and read again by the next parsing step.
//!

use std::fmt;
use std::fs::File;
use std::io::{self,
              BufReader,
              BufWriter,
              Read,
              Write};
use std::path::Path;

use chrono::{NaiveDate,
             NaiveDateTime,
             Datelike,
             Timelike};

use crate::constants::{NCELLS,
                       NCHN,
                       CHANNEL_TAG_BASE};
use crate::errors::ReaderError;
use crate::calibrations::CalibrationTable;
use crate::events::Capture;
use crate::serialization::{u8_to_u16,
                           u16_to_u8,
                           parse_u16,
                           parse_u32,
                           parse_f32};

/// Later versions carry extra words in the channel 
/// blocks, which this reader does not know about
pub const SUPPORTED_FILE_VERSION : u8 = 1;
pub const TIME_HEADER_TAG  : [u8;4] = *b"TIME";
pub const EVENT_HEADER_TAG : [u8;4] = *b"EHDR";
pub const BOARD_TAG        : [u8;2] = *b"B#";
pub const TRIGGER_CELL_TAG : [u8;2] = *b"T#";

/// Size of the event header after the tag
const EVENT_HEADER_BODY : usize = 28;

/// Decode the 1-based channel number from a channel tag 
/// ("C001" -> 1).
///
/// Returns None for anything which is not a channel tag
/// or refers to a channel we can not hold.
pub fn channel_from_tag(tag : &[u8;4]) -> Option<u8> {
  if tag[0] != b'C' {
    return None;
  }
  if !tag[3].is_ascii_digit() {
    return None;
  }
  let channel = tag[3] - CHANNEL_TAG_BASE;
  if channel == 0 || channel as usize > NCHN {
    return None;
  }
  Some(channel)
}

/// The tag for a 1-based channel number
pub fn channel_tag(channel : u8) -> Option<[u8;4]> {
  if channel == 0 || channel as usize > NCHN {
    return None;
  }
  Some([b'C', b'0', b'0', CHANNEL_TAG_BASE + channel])
}

/// Byte stream with a one-token lookahead
///
/// A tag which has been read, but belongs to the 
/// next record, can be pushed back and will be
/// returned by the next read.
#[derive(Debug)]
pub struct PushbackReader<R : Read> {
  inner            : R,
  pending          : Vec<u8>,
  pub n_bytes_read : usize,
}

impl<R : Read> PushbackReader<R> {

  pub fn new(inner : R) -> Self {
    Self {
      inner,
      pending      : Vec::<u8>::with_capacity(4),
      n_bytes_read : 0,
    }
  }

  /// Fill as much of the buffer as possible, return 
  /// the number of bytes.
  fn fill(&mut self, buf : &mut [u8]) -> Result<usize, ReaderError> {
    let n_pending = self.pending.len().min(buf.len());
    buf[..n_pending].copy_from_slice(&self.pending[..n_pending]);
    self.pending.drain(..n_pending);
    let mut nbytes = n_pending;
    while nbytes < buf.len() {
      match self.inner.read(&mut buf[nbytes..]) {
        Ok(0)  => break,
        Ok(n)  => nbytes += n,
        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
        Err(err) => {
          error!("Unable to read from stream! {err}");
          return Err(ReaderError::IoError);
        }
      }
    }
    self.n_bytes_read += nbytes - n_pending;
    Ok(nbytes)
  }

  /// Read the next 4 byte tag. 
  ///
  /// Returns None at the end of the stream, a partial
  /// tag is a ShortRead
  pub fn read_tag(&mut self) -> Result<Option<[u8;4]>, ReaderError> {
    let mut tag = [0u8;4];
    match self.fill(&mut tag)? {
      0 => Ok(None),
      4 => Ok(Some(tag)),
      _ => Err(ReaderError::ShortRead)
    }
  }

  /// Give a tag back to the stream. There is only 
  /// room for a single tag.
  pub fn unread_tag(&mut self, tag : [u8;4]) {
    if !self.pending.is_empty() {
      warn!("Pushing back {:?}, but {:?} has not been consumed yet! Discarding it.", tag, self.pending);
      self.pending.clear();
    }
    self.pending.extend_from_slice(&tag);
  }

  pub fn read_exact(&mut self, buf : &mut [u8]) -> Result<(), ReaderError> {
    let nbytes = self.fill(buf)?;
    if nbytes == buf.len() {
      Ok(())
    } else if nbytes == 0 {
      Err(ReaderError::UnexpectedEOF)
    } else {
      Err(ReaderError::ShortRead)
    }
  }
}

/// Read binary capture files sequentially
///
/// The time header and the calibration blocks are 
/// read when the reader is created, the events are
/// then available through the iterator.
///
/// The iterator ends at the end of the file or with 
/// the first incomplete record. Incomplete records 
/// are discarded.
pub struct DrsFileReader<R : Read> {
  pub filename      : String,
  stream            : PushbackReader<R>,
  /// Version digit of the "DRS<n>" tag, if there was one
  pub file_version  : Option<u8>,
  pub board_serial  : u16,
  calibration       : CalibrationTable,
  n_events_read     : usize,
  pub eof_reached   : bool,
}

impl DrsFileReader<BufReader<File>> {

  pub fn new(path : &Path) -> Result<Self, ReaderError> {
    let file = match File::open(path) {
      Err(err) => {
        error!("Cannot find file '{}'! {err}", path.display());
        return Err(ReaderError::FileNotFound);
      }
      Ok(f) => f
    };
    info!("Reading from {}", path.display());
    Self::from_reader(BufReader::new(file), path.display().to_string())
  }
}

impl<R : Read> DrsFileReader<R> {

  pub fn from_reader(reader : R, filename : String) -> Result<Self, ReaderError> {
    let mut drs_reader = Self {
      filename,
      stream        : PushbackReader::new(reader),
      file_version  : None,
      board_serial  : 0,
      calibration   : CalibrationTable::new(0),
      n_events_read : 0,
      eof_reached   : false,
    };
    drs_reader.read_time_header()?;
    drs_reader.read_calibration()?;
    Ok(drs_reader)
  }

  fn read_time_header(&mut self) -> Result<(), ReaderError> {
    let mut tag = match self.stream.read_tag()? {
      None      => return Err(ReaderError::UnexpectedEOF),
      Some(tag) => tag
    };
    if tag[0..3] == *b"DRS" {
      let version = tag[3].wrapping_sub(b'0');
      if version != SUPPORTED_FILE_VERSION {
        error!("File {} has version tag {}, only version {} can be read!",
               self.filename, String::from_utf8_lossy(&tag), SUPPORTED_FILE_VERSION);
        return Err(ReaderError::InvalidHeader);
      }
      self.file_version = Some(version);
      debug!("Found file version tag {}", String::from_utf8_lossy(&tag));
      tag = match self.stream.read_tag()? {
        None      => return Err(ReaderError::UnexpectedEOF),
        Some(tag) => tag
      };
    }
    if tag != TIME_HEADER_TAG {
      error!("File {} does not start with a time header, got {:?}!", self.filename, tag);
      return Err(ReaderError::InvalidHeader);
    }
    let mut rest = [0u8;4];
    self.stream.read_exact(&mut rest)?;
    if rest[0..2] != BOARD_TAG {
      warn!("Unexpected board tag {:?}", &rest[0..2]);
    }
    self.board_serial = parse_u16(&rest, &mut 2);
    self.calibration.board_serial = self.board_serial;
    info!("Found data for board #{}", self.board_serial);
    Ok(())
  }

  fn read_calibration(&mut self) -> Result<(), ReaderError> {
    let mut buffer = vec![0u8; 4*NCELLS];
    loop {
      let tag = match self.stream.read_tag()? {
        None      => break,
        Some(tag) => tag
      };
      let channel = match channel_from_tag(&tag) {
        None => {
          self.stream.unread_tag(tag);
          break;
        }
        Some(ch) => ch
      };
      self.stream.read_exact(&mut buffer)?;
      let mut pos = 0usize;
      let widths : Vec<f32> = (0..NCELLS).map(|_| parse_f32(&buffer, &mut pos)).collect();
      if self.calibration.is_calibrated(channel) {
        warn!("Found a second calibration block for channel #{}, overwriting!", channel);
      }
      // channel and size are valid at this point
      if let Err(err) = self.calibration.set_widths(channel, &widths) {
        error!("Unable to store calibration for channel #{}! {err}", channel);
      }
      info!("Found timing calibration for channel #{}", channel);
    }
    Ok(())
  }

  /// The calibration blocks found in the file
  pub fn calibration(&self) -> &CalibrationTable {
    &self.calibration
  }

  pub fn get_n_events_read(&self) -> usize {
    self.n_events_read
  }

  /// Read the next event
  ///
  /// Ok(None) means the file ended cleanly before 
  /// an event header. 
  pub fn read_capture(&mut self) -> Result<Option<Capture>, ReaderError> {
    let tag = match self.stream.read_tag()? {
      None      => return Ok(None),
      Some(tag) => tag
    };
    if tag != EVENT_HEADER_TAG {
      error!("Expected an event header, but got {:?}!", tag);
      return Err(ReaderError::InvalidHeader);
    }
    let mut header = [0u8;EVENT_HEADER_BODY];
    self.stream.read_exact(&mut header)?;
    let mut pos = 0usize;
    let mut capture       = Capture::new();
    capture.meta.event_id = parse_u32(&header, &mut pos);
    let mut date = [0u16;7];
    for field in date.iter_mut() {
      *field = parse_u16(&header, &mut pos);
    }
    capture.meta.timestamp = decode_timestamp(&date);
    pos += 2; // reserved
    if header[pos..pos+2] != BOARD_TAG {
      warn!("Unexpected board tag {:?} in event {}", &header[pos..pos+2], capture.meta.event_id);
    }
    pos += 2;
    capture.meta.board_serial = parse_u16(&header, &mut pos);
    if header[pos..pos+2] != TRIGGER_CELL_TAG {
      warn!("Unexpected trigger cell tag {:?} in event {}", &header[pos..pos+2], capture.meta.event_id);
    }
    pos += 2;
    capture.trigger_cell = parse_u16(&header, &mut pos);
    debug!("Found event #{}", capture.meta.event_id);

    let mut buffer = vec![0u8; 2*NCELLS];
    loop {
      let tag = match self.stream.read_tag()? {
        None      => break,
        Some(tag) => tag
      };
      let channel = match channel_from_tag(&tag) {
        None => {
          self.stream.unread_tag(tag);
          break;
        }
        Some(ch) => ch
      };
      self.stream.read_exact(&mut buffer)?;
      let adc = u8_to_u16(&buffer);
      if capture.get_channel(channel).is_some() {
        warn!("Channel #{} appears twice in event {}, keeping the last one!", channel, capture.meta.event_id);
        capture.channels.retain(|c| c.channel != channel);
      }
      capture.add_channel(channel, adc);
    }
    self.n_events_read += 1;
    Ok(Some(capture))
  }
}

/// Date fields are year, month, day, hour, minute, second, millisecond
fn decode_timestamp(date : &[u16;7]) -> Option<NaiveDateTime> {
  NaiveDate::from_ymd_opt(date[0] as i32, date[1] as u32, date[2] as u32)
    .and_then(|d| d.and_hms_milli_opt(date[3] as u32, date[4] as u32, date[5] as u32, date[6] as u32))
}

impl<R : Read> Iterator for DrsFileReader<R> {
  type Item = Capture;

  fn next(&mut self) -> Option<Self::Item> {
    if self.eof_reached {
      return None;
    }
    match self.read_capture() {
      Ok(Some(capture)) => Some(capture),
      Ok(None) => {
        debug!("Reached end of file {} after {} events", self.filename, self.n_events_read);
        self.eof_reached = true;
        None
      }
      Err(ReaderError::ShortRead) | Err(ReaderError::UnexpectedEOF) => {
        warn!("File {} ends with an incomplete event, discarding it!", self.filename);
        self.eof_reached = true;
        None
      }
      Err(err) => {
        error!("Unable to read event from {}! {err}", self.filename);
        self.eof_reached = true;
        None
      }
    }
  }
}

impl<R : Read> fmt::Display for DrsFileReader<R> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<DrsFileReader : file {}, board #{}, read {} events, {}>",
           self.filename,
           self.board_serial,
           self.n_events_read,
           self.calibration)
  }
}

/// Write binary capture files in the layout 
/// `DrsFileReader` understands
pub struct DrsFileWriter<W : Write> {
  writer               : W,
  pub n_events_written : usize,
}

impl DrsFileWriter<BufWriter<File>> {
  
  pub fn create(path : &Path) -> io::Result<Self> {
    let file = File::create(path)?;
    info!("Writing to {}", path.display());
    Ok(Self::new(BufWriter::new(file)))
  }
}

impl<W : Write> DrsFileWriter<W> {

  pub fn new(writer : W) -> Self {
    Self {
      writer,
      n_events_written : 0,
    }
  }

  pub fn write_time_header(&mut self, board_serial : u16) -> io::Result<()> {
    self.writer.write_all(&TIME_HEADER_TAG)?;
    self.writer.write_all(&BOARD_TAG)?;
    self.writer.write_all(&board_serial.to_le_bytes())?;
    Ok(())
  }

  /// One block for each calibrated channel
  pub fn write_calibration(&mut self, table : &CalibrationTable) -> io::Result<()> {
    for ch in table.calibrated_channels() {
      if let (Some(tag), Ok(widths)) = (channel_tag(ch), table.widths(ch)) {
        self.writer.write_all(&tag)?;
        for w in widths.iter() {
          self.writer.write_all(&w.to_le_bytes())?;
        }
      }
    }
    Ok(())
  }

  pub fn write_capture(&mut self, capture : &Capture) -> io::Result<()> {
    let mut stream = Vec::<u8>::with_capacity(4 + EVENT_HEADER_BODY + capture.channels.len()*(4 + 2*NCELLS));
    stream.extend_from_slice(&EVENT_HEADER_TAG);
    stream.extend_from_slice(&capture.meta.event_id.to_le_bytes());
    let date : [u16;7] = match capture.meta.timestamp {
      None     => [0;7],
      Some(ts) => [ts.year() as u16,
                   ts.month() as u16,
                   ts.day() as u16,
                   ts.hour() as u16,
                   ts.minute() as u16,
                   ts.second() as u16,
                   (ts.nanosecond()/1_000_000) as u16]
    };
    for field in date {
      stream.extend_from_slice(&field.to_le_bytes());
    }
    stream.extend_from_slice(&0u16.to_le_bytes());
    stream.extend_from_slice(&BOARD_TAG);
    stream.extend_from_slice(&capture.meta.board_serial.to_le_bytes());
    stream.extend_from_slice(&TRIGGER_CELL_TAG);
    stream.extend_from_slice(&capture.trigger_cell.to_le_bytes());
    for raw in &capture.channels {
      match channel_tag(raw.channel) {
        None => {
          error!("Can not write channel {}, it has no valid tag!", raw.channel);
          continue;
        }
        Some(tag) => {
          stream.extend_from_slice(&tag);
          stream.extend_from_slice(&u16_to_u8(&raw.adc));
        }
      }
    }
    self.writer.write_all(&stream)?;
    self.n_events_written += 1;
    Ok(())
  }

  pub fn flush(&mut self) -> io::Result<()> {
    self.writer.flush()
  }

  /// Give back the underlying writer
  pub fn into_inner(self) -> W {
    self.writer
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  #[test]
  fn channel_tags() {
    assert_eq!(channel_from_tag(b"C001"), Some(1));
    assert_eq!(channel_from_tag(b"C008"), Some(8));
    assert_eq!(channel_from_tag(b"C000"), None);
    assert_eq!(channel_from_tag(b"C009"), None);
    assert_eq!(channel_from_tag(b"C00x"), None);
    assert_eq!(channel_from_tag(b"EHDR"), None);
    for ch in 1..=NCHN as u8 {
      assert_eq!(channel_from_tag(&channel_tag(ch).unwrap()), Some(ch));
    }
    assert_eq!(channel_tag(0), None);
    assert_eq!(channel_tag(9), None);
  }

  #[test]
  fn pushback_returns_tag_again() {
    let data = b"ABCDEFGH".to_vec();
    let mut reader = PushbackReader::new(Cursor::new(data));
    let tag = reader.read_tag().unwrap().unwrap();
    assert_eq!(&tag, b"ABCD");
    reader.unread_tag(tag);
    assert_eq!(&reader.read_tag().unwrap().unwrap(), b"ABCD");
    let mut buf = [0u8;2];
    reader.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"EF");
    assert_eq!(reader.read_tag(), Err(ReaderError::ShortRead));
    assert_eq!(reader.read_tag(), Ok(None));
    assert_eq!(reader.n_bytes_read, 8);
  }

  #[test]
  fn pushback_serves_partial_reads() {
    let mut reader = PushbackReader::new(Cursor::new(b"XY".to_vec()));
    reader.unread_tag(*b"ABCD");
    let mut buf = [0u8;3];
    reader.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"ABC");
    reader.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"DXY");
    assert_eq!(reader.read_exact(&mut buf), Err(ReaderError::UnexpectedEOF));
  }

  #[test]
  fn timestamps() {
    let ts = decode_timestamp(&[2014, 7, 30, 12, 34, 56, 789]).unwrap();
    assert_eq!(ts.to_string(), "2014-07-30 12:34:56.789");
    assert!(decode_timestamp(&[0;7]).is_none());
  }

  #[test]
  fn file_without_time_header() {
    let result = DrsFileReader::from_reader(Cursor::new(b"EHDR0000".to_vec()), String::from("test"));
    assert_eq!(result.err(), Some(ReaderError::InvalidHeader));
    let result = DrsFileReader::from_reader(Cursor::new(Vec::<u8>::new()), String::from("test"));
    assert_eq!(result.err(), Some(ReaderError::UnexpectedEOF));
  }

  #[test]
  fn version_tag_is_accepted() {
    let mut stream = b"DRS1".to_vec();
    stream.extend_from_slice(b"TIMEB#");
    stream.extend_from_slice(&2345u16.to_le_bytes());
    let reader = DrsFileReader::from_reader(Cursor::new(stream), String::from("test")).unwrap();
    assert_eq!(reader.file_version, Some(1));
    assert_eq!(reader.board_serial, 2345);
  }

  #[test]
  fn unknown_version_is_refused() {
    let mut stream = b"DRS2".to_vec();
    stream.extend_from_slice(b"TIMEB#");
    stream.extend_from_slice(&2345u16.to_le_bytes());
    let result = DrsFileReader::from_reader(Cursor::new(stream), String::from("test"));
    assert_eq!(result.err(), Some(ReaderError::InvalidHeader));
  }
}
