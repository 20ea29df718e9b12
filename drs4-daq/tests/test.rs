use std::sync::{
    Arc,
    Mutex,
};
use std::time::Duration;

use drs4_dataclasses::{
    CalibrationTable,
    MissingCalibrationPolicy,
};
use drs4_dataclasses::constants::NCELLS;
use drs4_dataclasses::io::DrsFileReader;

use drs4_daq::banks::BankEvent;
use drs4_daq::board::{
    Board,
    SimulatedBoard,
    chip_channel,
};
use drs4_daq::errors::{
    BoardError,
    DriverError,
    QueueError,
};
use drs4_daq::ring::{
    EventQueue,
    event_ring,
};
use drs4_daq::settings::{
    BoardSettings,
    ReadoutSettings,
};
use drs4_daq::thread_control::ThreadControl;
use drs4_daq::threads::{
    AcquisitionDriver,
    DriverState,
};

/// Queue which can be told to time out or 
/// to be disconnected
#[derive(Default)]
struct FakeQueue {
  timeouts_left : usize,
  disconnected  : bool,
  published     : Vec<Vec<u8>>,
  n_discarded   : usize,
}

impl EventQueue for FakeQueue {
  fn get_write_slot(&mut self, _timeout : Duration) -> Result<Vec<u8>, QueueError> {
    if self.disconnected {
      return Err(QueueError::Disconnected);
    }
    if self.timeouts_left > 0 {
      self.timeouts_left -= 1;
      return Err(QueueError::Timeout);
    }
    Ok(Vec::<u8>::new())
  }

  fn publish(&mut self, slot : Vec<u8>) -> Result<(), QueueError> {
    self.published.push(slot);
    Ok(())
  }

  fn discard(&mut self, _slot : Vec<u8>) {
    self.n_discarded += 1;
  }
}

fn fast_settings() -> ReadoutSettings {
  let mut settings = ReadoutSettings::new();
  settings.queue_timeout_ms = 1;
  settings.idle_sleep_ms    = 0;
  settings
}

fn configured_board() -> SimulatedBoard {
  let mut board = SimulatedBoard::new(7);
  board.configure(&BoardSettings::new()).unwrap();
  board
}

fn control(max_events : u64) -> Arc<Mutex<ThreadControl>> {
  let mut tc = ThreadControl::new();
  tc.run_active = true;
  tc.max_events = max_events;
  Arc::new(Mutex::new(tc))
}

#[test]
fn run_publishes_aligned_bank_events() {
  let mut board = configured_board();
  board.trigger_cells = vec![0, 17, 1023, 512, 300];
  board.set_bin_widths(chip_channel(1), vec![0.19;NCELLS]);
  let (ring, consumer) = event_ring(8, 40000);
  let mut driver = AcquisitionDriver::new(board, ring, fast_settings(), None).unwrap();
  let ctrl = control(5);
  driver.run(&ctrl).unwrap();
  assert_eq!(driver.statistics().n_published, 5);
  assert_eq!(driver.state(), DriverState::Idle);
  assert_eq!(ctrl.lock().unwrap().n_events_published, 5);
  assert!(!ctrl.lock().unwrap().thread_readout_active);

  let cells = [0usize, 17, 1023, 512, 300];
  for k in 0..5 {
    let slot  = consumer.try_recv().unwrap().unwrap();
    let event = BankEvent::from_bytestream(&slot).unwrap();
    assert_eq!(event.header.event_id, 666);
    assert_eq!(event.header.serial_number, k as u32);
    let names : Vec<String> = event.banks.iter().map(|b| b.get_name()).collect();
    assert_eq!(names, vec!["TC00", "TC01", "CC00", "CC01"]);
    let t0 = event.get_bank("TC00").unwrap().as_f32();
    let t1 = event.get_bank("TC01").unwrap().as_f32();
    assert_eq!(t0.len(), NCELLS);
    assert_eq!(t0[0], 0.0);
    let anchor = (NCELLS - cells[k]) % NCELLS;
    assert!((t0[anchor] - t1[anchor]).abs() < 1e-3);
    let u0 = event.get_bank("CC00").unwrap().as_f32();
    let max_mv = u0.iter().cloned().fold(f32::MIN, f32::max);
    assert!(max_mv > 50.0);
    consumer.release(slot);
  }
  assert_eq!(consumer.try_recv(), Ok(None));
}

#[test]
fn queue_timeouts_are_retried() {
  let queue = FakeQueue {
    timeouts_left : 3,
    ..Default::default()
  };
  let mut driver = AcquisitionDriver::new(configured_board(), queue, fast_settings(), None).unwrap();
  driver.run(&control(2)).unwrap();
  let stats = driver.statistics();
  assert_eq!(stats.n_queue_timeouts, 3);
  assert_eq!(stats.n_published, 2);
  assert_eq!(driver.queue().published.len(), 2);
}

#[test]
fn disconnected_queue_halts() {
  let queue = FakeQueue {
    disconnected : true,
    ..Default::default()
  };
  let mut driver = AcquisitionDriver::new(configured_board(), queue, fast_settings(), None).unwrap();
  let ctrl = control(0);
  assert_eq!(driver.run(&ctrl), Err(DriverError::Queue(QueueError::Disconnected)));
  assert!(ctrl.lock().unwrap().stop_flag);
  assert_eq!(driver.statistics().n_captures, 0);
}

#[test]
fn stuck_board_times_out() {
  let mut board = configured_board();
  board.stuck = true;
  let mut settings = fast_settings();
  settings.busy_timeout_ms = Some(5);
  let mut driver = AcquisitionDriver::new(board, FakeQueue::default(), settings, None).unwrap();
  let ctrl = control(0);
  assert_eq!(driver.run(&ctrl), Err(DriverError::Board(BoardError::BusyTimeout)));
  assert_eq!(driver.queue().n_discarded, 1);
  assert!(driver.queue().published.is_empty());
  assert!(ctrl.lock().unwrap().stop_flag);
}

#[test]
fn transfer_failure_halts() {
  let mut board = configured_board();
  board.broken = true;
  let mut driver = AcquisitionDriver::new(board, FakeQueue::default(), fast_settings(), None).unwrap();
  assert_eq!(driver.run(&control(0)), Err(DriverError::Board(BoardError::Hardware)));
  assert_eq!(driver.queue().n_discarded, 1);
}

#[test]
fn one_cycle_through_all_states() {
  let mut driver = AcquisitionDriver::new(configured_board(), FakeQueue::default(), fast_settings(), None).unwrap();
  let ctrl = control(0);
  let mut states = vec![driver.state()];
  for _ in 0..5 {
    assert!(driver.step(&ctrl).unwrap());
    states.push(driver.state());
  }
  assert_eq!(states, vec![DriverState::Idle,
                          DriverState::Arming,
                          DriverState::WaitingTrigger,
                          DriverState::Busy,
                          DriverState::Transferring,
                          DriverState::Idle]);
  assert_eq!(driver.queue().published.len(), 1);
}

#[test]
fn inactive_run_stays_idle() {
  let mut driver = AcquisitionDriver::new(configured_board(), FakeQueue::default(), fast_settings(), None).unwrap();
  let ctrl = control(0);
  ctrl.lock().unwrap().run_active = false;
  for _ in 0..3 {
    assert!(driver.step(&ctrl).unwrap());
    assert_eq!(driver.state(), DriverState::Idle);
  }
  ctrl.lock().unwrap().stop_flag = true;
  assert!(!driver.step(&ctrl).unwrap());
}

#[test]
fn uncalibrated_input_aborts_the_event() {
  let mut board = configured_board();
  board.remove_bin_widths(chip_channel(1));
  let mut driver = AcquisitionDriver::new(board, FakeQueue::default(), fast_settings(), None).unwrap();
  assert!(!driver.decoder().calibration().is_calibrated(2));
  let ctrl = control(0);
  for _ in 0..5 {
    driver.step(&ctrl).unwrap();
  }
  assert_eq!(driver.state(), DriverState::Idle);
  assert_eq!(driver.statistics().n_captures, 1);
  assert_eq!(driver.statistics().n_decode_failures, 1);
  assert!(driver.queue().published.is_empty());
  assert_eq!(driver.queue().n_discarded, 1);
}

#[test]
fn uncalibrated_input_with_fallback() {
  let mut board = configured_board();
  board.remove_bin_widths(chip_channel(1));
  let mut fallback = CalibrationTable::new(7);
  fallback.set_widths(2, &[0.2;NCELLS]).unwrap();
  let mut settings = fast_settings();
  settings.missing_calibration = MissingCalibrationPolicy::UseFallback;
  let mut driver = AcquisitionDriver::new(board, FakeQueue::default(), settings, Some(fallback)).unwrap();
  driver.run(&control(1)).unwrap();
  assert_eq!(driver.statistics().n_decode_failures, 0);
  let event = BankEvent::from_bytestream(&driver.queue().published[0]).unwrap();
  assert_eq!(event.get_bank("TC01").unwrap().as_f32().len(), NCELLS);
}

#[test]
fn input_out_of_range() {
  let mut settings = fast_settings();
  settings.active_inputs = vec![0, 4];
  let result = AcquisitionDriver::new(configured_board(), FakeQueue::default(), settings, None);
  assert_eq!(result.err(), Some(DriverError::Board(BoardError::ChannelUnavailable)));
}

#[test]
fn raw_captures_are_recorded() {
  let path = std::env::temp_dir().join("drs4-daq-test-record.dat");
  let mut board = configured_board();
  board.trigger_cells = vec![5, 6, 7];
  let mut settings = fast_settings();
  settings.active_inputs = vec![0, 2, 3];
  settings.record_file   = Some(path.display().to_string());
  let mut driver = AcquisitionDriver::new(board, FakeQueue::default(), settings, None).unwrap();
  driver.run(&control(3)).unwrap();
  drop(driver);

  let reader = DrsFileReader::new(&path).unwrap();
  assert_eq!(reader.board_serial, 7);
  assert_eq!(reader.calibration().calibrated_channels(), vec![1, 3, 4]);
  let captures : Vec<_> = reader.collect();
  assert_eq!(captures.len(), 3);
  let cells : Vec<u16> = captures.iter().map(|c| c.trigger_cell).collect();
  assert_eq!(cells, vec![5, 6, 7]);
  assert_eq!(captures[2].get_active_channels(), vec![1, 3, 4]);
  assert_eq!(captures[2].meta.event_id, 2);
  let _ = std::fs::remove_file(&path);
}

#[test]
fn recorded_captures_have_distinct_ids() {
  let path = std::env::temp_dir().join("drs4-daq-test-record-uncalibrated.dat");
  let mut board = configured_board();
  board.remove_bin_widths(chip_channel(1));
  let mut settings = fast_settings();
  settings.record_file = Some(path.display().to_string());
  let mut driver = AcquisitionDriver::new(board, FakeQueue::default(), settings, None).unwrap();
  let ctrl = control(0);
  for _ in 0..15 {
    driver.step(&ctrl).unwrap();
  }
  assert_eq!(driver.statistics().n_decode_failures, 3);
  drop(driver);

  let reader = DrsFileReader::new(&path).unwrap();
  let ids : Vec<u32> = reader.map(|c| c.meta.event_id).collect();
  assert_eq!(ids, vec![0, 1, 2]);
  let _ = std::fs::remove_file(&path);
}

#[test]
fn poisoned_control_stops_the_driver() {
  let mut driver = AcquisitionDriver::new(configured_board(), FakeQueue::default(), fast_settings(), None).unwrap();
  let ctrl = control(0);
  let ctrl_c = Arc::clone(&ctrl);
  let _ = std::thread::spawn(move || {
    let _tc = ctrl_c.lock().unwrap();
    panic!("thread holding the control died");
  }).join();
  assert!(ctrl.is_poisoned());
  assert!(!driver.step(&ctrl).unwrap());
  assert_eq!(driver.state(), DriverState::Idle);
}
