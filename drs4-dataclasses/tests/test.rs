use std::io::Cursor;
use std::sync::Arc;

use drs4_dataclasses::constants::NCELLS;
use drs4_dataclasses::errors::{DecodingError,
                               ReaderError};
use drs4_dataclasses::io::{DrsFileReader,
                           DrsFileWriter};
use drs4_dataclasses::{CalibrationTable,
                       Capture,
                       Decoder,
                       FromRandom,
                       VoltageRange};
use drs4_dataclasses::serialization::Serialization;

/// Build a capture file in memory
fn write_file(table : &CalibrationTable, captures : &[Capture]) -> Vec<u8> {
  let mut writer = DrsFileWriter::new(Vec::<u8>::new());
  writer.write_time_header(table.board_serial).unwrap();
  writer.write_calibration(table).unwrap();
  for cap in captures {
    writer.write_capture(cap).unwrap();
  }
  writer.into_inner()
}

fn open(stream : Vec<u8>) -> DrsFileReader<Cursor<Vec<u8>>> {
  DrsFileReader::from_reader(Cursor::new(stream), String::from("memory")).unwrap()
}

fn capture(event_id : u32, trigger_cell : u16, channels : &[u8], adc : u16) -> Capture {
  let mut cap          = Capture::new();
  cap.meta.event_id    = event_id;
  cap.trigger_cell     = trigger_cell;
  for ch in channels {
    cap.add_channel(*ch, vec![adc;NCELLS]);
  }
  cap
}

#[test]
fn unit_widths_give_cell_index_as_time() {
  let mut table = CalibrationTable::new(2901);
  for ch in 1..=4 {
    table.set_widths(ch, &[1.0;NCELLS]).unwrap();
  }
  let stream     = write_file(&table, &[capture(1, 0, &[1,2,3,4], 32768)]);
  let mut reader = open(stream);
  assert_eq!(reader.board_serial, 2901);
  assert_eq!(reader.calibration(), &table);
  let decoder = Decoder::new(Arc::new(reader.calibration().clone()), VoltageRange::new());
  let cap     = reader.next().unwrap();
  let event   = decoder.decode(&cap).unwrap();
  assert_eq!(event.get_nchan(), 4);
  for tr in event.traces() {
    for k in 0..NCELLS {
      assert_eq!(tr.nanoseconds[k], k as f64);
      assert_eq!(tr.voltages[k], 0.0);
    }
  }
  assert!(reader.next().is_none());
  assert_eq!(reader.get_n_events_read(), 1);
}

#[test]
fn single_channel_constant_width() {
  let mut table = CalibrationTable::new(1);
  table.set_widths(1, &[0.2;NCELLS]).unwrap();
  let stream     = write_file(&table, &[capture(7, 512, &[1], 0)]);
  let mut reader = open(stream);
  let decoder    = Decoder::new(Arc::new(reader.calibration().clone()), VoltageRange::new());
  let cap        = reader.next().unwrap();
  assert_eq!(cap.trigger_cell, 512);
  let event      = decoder.decode(&cap).unwrap();
  assert_eq!(event.trigger_cell(), 512);
  assert_eq!(event.meta().event_id, 7);
  let tr = event.get_trace(1).unwrap();
  assert_eq!(tr.voltages.len(), NCELLS);
  assert!(tr.voltages.iter().all(|v| *v == -0.5));
  for k in 0..NCELLS {
    assert!((tr.nanoseconds[k] - (k as f64)*0.2).abs() < 1e-4);
  }
}

#[test]
fn channels_share_the_anchor_time() {
  let mut table = CalibrationTable::new(1);
  for ch in 1..=4u8 {
    let widths : Vec<f32> = (0..NCELLS).map(|k| 0.15 + 0.01*(ch as f32) + 0.0001*((k*ch as usize) % 97) as f32).collect();
    table.set_widths(ch, &widths).unwrap();
  }
  let trigger_cell = 700u16;
  let decoder = Decoder::new(Arc::new(table), VoltageRange::new());
  let event   = decoder.decode(&capture(3, trigger_cell, &[2,4,1,3], 1000)).unwrap();
  let anchor  = (NCELLS - trigger_cell as usize) % NCELLS;
  let t_ref   = event.get_trace(1).unwrap().nanoseconds[anchor];
  for tr in event.traces() {
    assert!((tr.nanoseconds[anchor] - t_ref).abs() < 1e-9);
  }
  // the reference channel is untouched
  assert_eq!(event.get_trace(1).unwrap().nanoseconds[0], 0.0);
}

#[test]
fn decoding_twice_is_identical() {
  let mut table = CalibrationTable::new(1);
  let widths : Vec<f32> = (0..NCELLS).map(|k| 0.2 + 0.001*((k % 13) as f32)).collect();
  table.set_widths(1, &widths).unwrap();
  table.set_widths(2, &widths).unwrap();
  let decoder = Decoder::new(Arc::new(table), VoltageRange::new());
  let cap     = capture(1, 333, &[1,2], 4242);
  let first   = decoder.decode(&cap).unwrap();
  let second  = decoder.decode(&cap).unwrap();
  assert_eq!(first, second);
}

#[test]
fn missing_calibration_gives_no_event() {
  let mut table = CalibrationTable::new(1);
  table.set_widths(1, &[0.2;NCELLS]).unwrap();
  let stream     = write_file(&table, &[capture(1, 10, &[1,2], 100)]);
  let mut reader = open(stream);
  let decoder    = Decoder::new(Arc::new(reader.calibration().clone()), VoltageRange::new());
  let cap        = reader.next().unwrap();
  assert_eq!(decoder.decode(&cap), Err(DecodingError::CalibrationMissing { channel : 2 }));
}

#[test]
fn several_events_and_truncated_tail() {
  let mut table = CalibrationTable::new(1);
  table.set_widths(1, &[0.2;NCELLS]).unwrap();
  table.set_widths(2, &[0.2;NCELLS]).unwrap();
  let caps = vec![capture(1, 10, &[1,2], 100),
                  capture(2, 20, &[2], 200),
                  capture(3, 30, &[1,2], 300)];
  let mut stream = write_file(&table, &caps);
  // cut into the last channel block
  stream.truncate(stream.len() - 100);
  let reader = open(stream);
  let read : Vec<Capture> = reader.collect();
  assert_eq!(read.len(), 2);
  assert_eq!(read[0], caps[0]);
  assert_eq!(read[1], caps[1]);
}

#[test]
fn truncated_event_header_ends_stream() {
  let table      = CalibrationTable::new(1);
  let mut stream = write_file(&table, &[capture(1, 10, &[], 0)]);
  stream.extend_from_slice(b"EHDR");
  stream.extend_from_slice(&[0u8;5]);
  let mut reader = open(stream);
  let cap = reader.next().unwrap();
  assert!(cap.channels.is_empty());
  assert!(reader.next().is_none());
  assert!(reader.eof_reached);
}

#[test]
fn missing_file() {
  let result = DrsFileReader::new(std::path::Path::new("this-file-does-not-exist.dat"));
  assert_eq!(result.err(), Some(ReaderError::FileNotFound));
}

#[test]
fn calibration_table_file() {
  let mut table = CalibrationTable::new(77);
  table.set_widths(3, &[0.3;NCELLS]).unwrap();
  let path = std::env::temp_dir().join("drs4-dataclasses-test-table.cal");
  table.to_file(&path).unwrap();
  let test = CalibrationTable::from_file(&path).unwrap();
  assert_eq!(test, table);
  let _ = std::fs::remove_file(&path);
}

/// Random table which covers all channels of the capture
fn random_table_for(capture : &Capture) -> CalibrationTable {
  let mut table = CalibrationTable::from_random();
  let widths    = *table.widths(1).unwrap();
  for ch in capture.get_active_channels() {
    if !table.is_calibrated(ch) {
      table.set_widths(ch, &widths).unwrap();
    }
  }
  table
}

#[test]
fn random_captures_decode_reproducibly_and_aligned() {
  for _ in 0..20 {
    let capture = Capture::from_random();
    let table   = random_table_for(&capture);
    assert!(table.validate().is_ok());
    let decoder = Decoder::new(Arc::new(table), VoltageRange::new());
    let first   = decoder.decode(&capture).unwrap();
    let second  = decoder.decode(&capture).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.get_nchan(), capture.channels.len());
    let anchor  = (NCELLS - capture.trigger_cell as usize) % NCELLS;
    let t_ref   = first.get_trace(1).unwrap().nanoseconds[anchor];
    for tr in first.traces() {
      assert!((tr.nanoseconds[anchor] - t_ref).abs() < 1e-9);
    }
  }
}

#[test]
fn serialization_random_calibration_table() {
  for _ in 0..10 {
    let table  = CalibrationTable::from_random();
    let stream = table.to_bytestream();
    let test   = CalibrationTable::from_bytestream(&stream, &mut 0).unwrap();
    assert_eq!(test, table);
  }
}

#[test]
fn random_captures_survive_the_file() {
  let captures : Vec<Capture> = (0..5).map(|_| Capture::from_random()).collect();
  let table    = random_table_for(&captures[0]);
  let read : Vec<Capture> = open(write_file(&table, &captures)).collect();
  assert_eq!(read, captures);
}
