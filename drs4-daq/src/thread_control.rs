//! Thread control structures

use std::fmt;

/// Send runtime information 
/// to threads via shared memory
/// (Arc(Mutex)
#[derive(Default, Debug)]
pub struct ThreadControl {
  /// Stop ALL threads
  pub stop_flag                : bool,
  /// The run is ongoing. The readout idles 
  /// while this is false.
  pub run_active               : bool,
  /// Stop after this many events (0 for no limit)
  pub max_events               : u64,
  /// Number of events published by the readout
  pub n_events_published       : u64,
  /// Number of events processed by the data sink
  pub n_events_processed       : u64,
  /// alive indicator for readout thread
  pub thread_readout_active    : bool,
  /// alive indicator for data sink thread
  pub thread_data_sink_active  : bool,
}

impl ThreadControl {
  pub fn new() -> Self {
    Self {
      stop_flag               : false,
      run_active              : false,
      max_events              : 0,
      n_events_published      : 0,
      n_events_processed      : 0,
      thread_readout_active   : false,
      thread_data_sink_active : false,
    }
  }

  /// The requested number of events has been 
  /// published
  pub fn event_limit_reached(&self) -> bool {
    self.max_events > 0 && self.n_events_published >= self.max_events
  }
}

impl fmt::Display for ThreadControl {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = String::from("<ThreadControl:");
    repr        += &(format!("\n  run active     : {}", self.run_active));
    repr        += &(format!("\n  max events     : {}", self.max_events));
    repr        += &(format!("\n  published      : {}", self.n_events_published));
    repr        += &(format!("\n  processed      : {}", self.n_events_processed));
    repr        += "\n    -- program status:";
    repr        += &(format!("\n  stop flag : {}", self.stop_flag));
    repr        += "\n    -- reported thread activity:";
    repr        += &(format!("\n  readout        : {}", self.thread_readout_active));
    repr        += &(format!("\n  data sink      : {}>", self.thread_data_sink_active));
    write!(f, "{}", repr)
  }
}
