//! The acquisition driver
//!
//! Cycles the board through 
//!
//! Idle -> Arming -> WaitingTrigger -> Busy -> Transferring -> Idle
//!
//! * Idle           - check the run state, sleep if the run is not active
//! * Arming         - get a free slot from the event queue. If there is 
//!                    none in time, back off and go back to Idle.
//! * WaitingTrigger - start the domino wave
//! * Busy           - poll the board until the capture is done
//! * Transferring   - read the waveforms, decode them and publish 
//!                    the result into the slot
//!
//! Queue timeouts are the only errors which are retried,
//! everything else halts the driver.

use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::{
    Arc,
    Mutex,
};
use std::thread;
use std::time::{
    Duration,
    Instant,
};

use drs4_dataclasses::{
    CalibrationTable,
    Capture,
    DecodedEvent,
    Decoder,
};
use drs4_dataclasses::constants::N_INPUTS;
use drs4_dataclasses::io::DrsFileWriter;

use crate::banks::{
    BankEvent,
    EventHeader,
};
use crate::board::{
    Board,
    chip_channel,
};
use crate::dump::write_waveforms;
use crate::errors::{
    BoardError,
    DriverError,
    QueueError,
};
use crate::ring::EventQueue;
use crate::settings::ReadoutSettings;
use crate::thread_control::ThreadControl;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum DriverState {
  Idle,
  Arming,
  WaitingTrigger,
  Busy,
  Transferring,
}

impl fmt::Display for DriverState {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      DriverState::Idle           => "Idle",
      DriverState::Arming         => "Arming",
      DriverState::WaitingTrigger => "WaitingTrigger",
      DriverState::Busy           => "Busy",
      DriverState::Transferring   => "Transferring",
    };
    write!(f, "<DriverState: {}>", repr)
  }
}

/// Counters of the acquisition driver
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct DriverStatistics {
  /// Captures read from the board
  pub n_captures        : u64,
  pub n_published       : u64,
  pub n_bytes_published : u64,
  /// Arming attempts without a free slot
  pub n_queue_timeouts  : u64,
  /// Captures which could not be decoded
  pub n_decode_failures : u64,
  pub n_busy_polls      : u64,
}

impl fmt::Display for DriverStatistics {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = String::from("<DriverStatistics:");
    repr += &(format!("\n  captures         : {}", self.n_captures));
    repr += &(format!("\n  published        : {}", self.n_published));
    repr += &(format!("\n  published bytes  : {}", self.n_bytes_published));
    repr += &(format!("\n  queue timeouts   : {}", self.n_queue_timeouts));
    repr += &(format!("\n  decode failures  : {}", self.n_decode_failures));
    repr += &(format!("\n  busy polls       : {}>", self.n_busy_polls));
    write!(f, "{}", repr)
  }
}

pub struct AcquisitionDriver<B : Board, Q : EventQueue> {
  board         : B,
  queue         : Q,
  decoder       : Decoder,
  settings      : ReadoutSettings,
  state         : DriverState,
  /// the slot acquired while arming
  slot          : Option<Vec<u8>>,
  /// serial number of the next published event. 
  /// Captures are numbered by `stats.n_captures`.
  serial_number : u32,
  stats         : DriverStatistics,
  recorder      : Option<DrsFileWriter<BufWriter<File>>>,
  start_time    : Instant,
}

impl<B : Board, Q : EventQueue> AcquisitionDriver<B, Q> {

  /// Set up the driver for a configured board
  ///
  /// The timing calibration of all active inputs is 
  /// queried from the board. Inputs the board has no 
  /// calibration for are decoded according to the 
  /// missing calibration policy.
  pub fn new(board    : B,
             queue    : Q,
             settings : ReadoutSettings,
             fallback : Option<CalibrationTable>) -> Result<Self, DriverError> {
    let mut table = CalibrationTable::new(board.serial_number());
    for input in &settings.active_inputs {
      if *input as usize >= N_INPUTS {
        error!("Input {} does not exist, the board has {} inputs!", input, N_INPUTS);
        return Err(DriverError::Board(BoardError::ChannelUnavailable));
      }
      let widths = board.bin_widths(chip_channel(*input))?;
      if widths.is_empty() {
        warn!("Board #{} has no timing calibration for input {}!", board.serial_number(), input);
        continue;
      }
      table.set_widths(input + 1, &widths)?;
    }
    if let Err(err) = table.validate() {
      warn!("Timing calibration of board #{} looks suspicious! {err}", board.serial_number());
    }
    let recorder = match &settings.record_file {
      None       => None,
      Some(path) => Self::open_recorder(Path::new(path), &table),
    };
    let mut decoder = Decoder::new(Arc::new(table), board.input_range());
    if let Some(fb) = fallback {
      decoder = decoder.with_fallback(Arc::new(fb));
    }
    // the fallback table is only used if the policy says so
    decoder.policy = settings.missing_calibration;
    info!("Using {}", decoder);
    Ok(Self {
      board,
      queue,
      decoder,
      settings,
      state         : DriverState::Idle,
      slot          : None,
      serial_number : 0,
      stats         : DriverStatistics::default(),
      recorder,
      start_time    : Instant::now(),
    })
  }

  fn open_recorder(path : &Path, table : &CalibrationTable) -> Option<DrsFileWriter<BufWriter<File>>> {
    let mut writer = match DrsFileWriter::create(path) {
      Err(err) => {
        error!("Unable to open {}, will not record raw data! {err}", path.display());
        return None;
      }
      Ok(writer) => writer
    };
    let header = writer.write_time_header(table.board_serial)
      .and_then(|_| writer.write_calibration(table));
    match header {
      Err(err) => {
        error!("Unable to write the header to {}! {err}", path.display());
        None
      }
      Ok(_) => Some(writer)
    }
  }

  pub fn state(&self) -> DriverState {
    self.state
  }

  pub fn statistics(&self) -> DriverStatistics {
    self.stats
  }

  pub fn decoder(&self) -> &Decoder {
    &self.decoder
  }

  pub fn board(&self) -> &B {
    &self.board
  }

  pub fn queue(&self) -> &Q {
    &self.queue
  }

  /// Run until the stop flag is set, the event limit is 
  /// reached or a fatal error occurs
  ///
  /// A fatal error sets the stop flag for all other 
  /// threads as well.
  pub fn run(&mut self, thread_control : &Arc<Mutex<ThreadControl>>) -> Result<(), DriverError> {
    set_readout_active(thread_control, true);
    self.start_time = Instant::now();
    let result = loop {
      match self.step(thread_control) {
        Ok(true)  => continue,
        Ok(false) => break Ok(()),
        Err(err)  => break Err(err),
      }
    };
    if let Some(slot) = self.slot.take() {
      self.queue.discard(slot);
    }
    self.state = DriverState::Idle;
    if let Some(recorder) = &mut self.recorder {
      if let Err(err) = recorder.flush() {
        error!("Unable to flush raw data file! {err}");
      }
    }
    let elapsed = self.start_time.elapsed().as_secs_f64();
    info!("Acquisition ended after {:.1} s, {}", elapsed, self.stats);
    match thread_control.lock() {
      Ok(mut tc) => {
        tc.thread_readout_active = false;
        if result.is_err() {
          tc.stop_flag = true;
        }
      }
      Err(err) => error!("Can't acquire lock for ThreadControl! {err}"),
    }
    if let Err(err) = &result {
      error!("Acquisition halted! {err}");
    }
    result
  }

  /// Execute the current state and move on to the next
  ///
  /// Returns false if the acquisition should end.
  pub fn step(&mut self, thread_control : &Arc<Mutex<ThreadControl>>) -> Result<bool, DriverError> {
    match self.state {
      DriverState::Idle => {
        let (stop, active) = match thread_control.lock() {
          Ok(tc) => (tc.stop_flag || tc.event_limit_reached(), tc.run_active),
          Err(err) => {
            error!("Can't acquire lock for ThreadControl, stopping! {err}");
            (true, false)
          }
        };
        if stop {
          return Ok(false);
        }
        if !active {
          thread::sleep(self.idle_sleep());
          return Ok(true);
        }
        self.state = DriverState::Arming;
      }
      DriverState::Arming => {
        match self.queue.get_write_slot(Duration::from_millis(self.settings.queue_timeout_ms)) {
          Ok(slot) => {
            self.slot  = Some(slot);
            self.state = DriverState::WaitingTrigger;
          }
          Err(QueueError::Timeout) => {
            self.stats.n_queue_timeouts += 1;
            debug!("No free slot in the event queue, backing off!");
            thread::sleep(self.idle_sleep());
            self.state = DriverState::Idle;
          }
          Err(err) => {
            return Err(DriverError::Queue(err));
          }
        }
      }
      DriverState::WaitingTrigger => {
        self.board.start_domino()?;
        trace!("Waiting for trigger...");
        self.state = DriverState::Busy;
      }
      DriverState::Busy => {
        self.wait_for_board()?;
        self.state = DriverState::Transferring;
      }
      DriverState::Transferring => {
        self.transfer(thread_control)?;
        self.state = DriverState::Idle;
      }
    }
    Ok(true)
  }

  fn idle_sleep(&self) -> Duration {
    Duration::from_millis(self.settings.idle_sleep_ms)
  }

  /// Poll the board until the capture is done
  ///
  /// A capture in progress can not be cancelled, 
  /// without a busy timeout this blocks as long as 
  /// the board is busy.
  fn wait_for_board(&mut self) -> Result<(), DriverError> {
    let start   = Instant::now();
    let timeout = self.settings.busy_timeout_ms.map(Duration::from_millis);
    let mut n_polls = 0u64;
    while self.board.is_busy()? {
      n_polls += 1;
      if let Some(max_wait) = timeout {
        if start.elapsed() > max_wait {
          error!("Board #{} still busy after {:?}!", self.board.serial_number(), max_wait);
          self.stats.n_busy_polls += n_polls;
          return Err(DriverError::Board(BoardError::BusyTimeout));
        }
      }
      std::hint::spin_loop();
    }
    self.stats.n_busy_polls += n_polls;
    Ok(())
  }

  /// Read the capture from the board, decode it and 
  /// publish the result
  fn transfer(&mut self, thread_control : &Arc<Mutex<ThreadControl>>) -> Result<(), DriverError> {
    self.board.transfer_waves()?;
    let mut capture = Capture::new();
    capture.trigger_cell      = self.board.trigger_cell();
    capture.meta.event_id     = self.stats.n_captures as u32;
    capture.meta.board_serial = self.board.serial_number();
    capture.meta.timestamp    = Some(chrono::Local::now().naive_local());
    for input in &self.settings.active_inputs {
      let adc = self.board.raw_waveform(chip_channel(*input))?;
      capture.add_channel(input + 1, adc);
    }
    self.stats.n_captures += 1;
    if let Some(recorder) = &mut self.recorder {
      if let Err(err) = recorder.write_capture(&capture) {
        error!("Unable to record capture {}! {err}", capture.meta.event_id);
      }
    }
    let mut slot = self.slot.take().unwrap_or_default();
    let event = match self.decoder.decode(&capture) {
      Err(err) => {
        self.stats.n_decode_failures += 1;
        warn!("Can not decode capture {}, discarding it! {err}", capture.meta.event_id);
        self.queue.discard(slot);
        return Ok(());
      }
      Ok(event) => event
    };
    if self.settings.dump_waveforms {
      self.dump(&event);
    }
    let header = EventHeader::new(self.settings.event_id,
                                  self.settings.trigger_mask,
                                  self.serial_number,
                                  chrono::Utc::now().timestamp() as u32);
    BankEvent::from_decoded(header, &event).write_into(&mut slot);
    let n_bytes = slot.len() as u64;
    self.queue.publish(slot)?;
    self.serial_number          += 1;
    self.stats.n_published      += 1;
    self.stats.n_bytes_published += n_bytes;
    match thread_control.lock() {
      Ok(mut tc) => tc.n_events_published += 1,
      Err(err)   => error!("Can't acquire lock for ThreadControl! {err}"),
    }
    Ok(())
  }

  fn dump(&self, event : &DecodedEvent) {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    if let Err(err) = write_waveforms(event, &mut handle) {
      error!("Unable to dump waveforms! {err}");
    }
  }
}

fn set_readout_active(thread_control : &Arc<Mutex<ThreadControl>>, active : bool) {
  match thread_control.lock() {
    Ok(mut tc) => tc.thread_readout_active = active,
    Err(err)   => error!("Can't acquire lock for ThreadControl! {err}"),
  }
}
