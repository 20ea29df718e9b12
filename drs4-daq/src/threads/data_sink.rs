//! Consumer of the event ring
//!
//! Checks every published event, optionally writes it 
//! to disk and gives the slot back to the ring.

use std::fs::File;
use std::io::{
    BufWriter,
    Write,
};
use std::path::PathBuf;
use std::sync::{
    Arc,
    Mutex,
};
use std::time::Duration;

use indicatif::{
    ProgressBar,
    ProgressStyle,
};

use crate::banks::BankEvent;
use crate::errors::QueueError;
use crate::ring::EventRingConsumer;
use crate::thread_control::ThreadControl;

/// Receive events until the readout has ended and 
/// the ring is drained
///
/// # Arguments:
///
/// * consumer       : receiving end of the event ring
/// * thread_control : shared run state
/// * output         : write the raw bank events to this file 
/// * show_progress  : number of events as progress bar
pub fn data_sink(consumer       : EventRingConsumer,
                 thread_control : Arc<Mutex<ThreadControl>>,
                 output         : Option<PathBuf>,
                 show_progress  : bool) -> u64 {
  let timeout = Duration::from_millis(100);
  let mut writer = match output {
    None       => None,
    Some(path) => {
      match File::create(&path) {
        Err(err) => {
          error!("Unable to open {}, will not write events! {err}", path.display());
          None
        }
        Ok(file) => {
          info!("Writing events to {}", path.display());
          Some(BufWriter::new(file))
        }
      }
    }
  };
  
  let mut max_events = 0u64;
  match thread_control.lock() {
    Ok(mut tc) => {
      tc.thread_data_sink_active = true;
      max_events = tc.max_events;
    }
    Err(err) => error!("Can't acquire lock for ThreadControl! {err}"),
  }
  let progress = if !show_progress {
    ProgressBar::hidden()
  } else if max_events > 0 {
    let template = "[{elapsed_precise}] {prefix} {msg} {spinner} {bar:60.blue/grey} {pos:>7}/{len:7}";
    let bar = ProgressBar::new(max_events);
    bar.set_style(ProgressStyle::with_template(template)
                  .unwrap_or_else(|_| ProgressStyle::default_bar()));
    bar
  } else {
    ProgressBar::new_spinner()
  };
  progress.set_prefix("Events");

  let mut n_events = 0u64;
  let mut n_broken = 0u64;
  loop {
    match consumer.recv_timeout(timeout) {
      Ok(slot) => {
        match BankEvent::from_bytestream(&slot) {
          Err(err) => {
            n_broken += 1;
            error!("Received broken event! {err}");
          }
          Ok(event) => {
            trace!("{}", event);
            n_events += 1;
            if let Some(w) = &mut writer {
              if let Err(err) = w.write_all(&slot) {
                error!("Unable to write event {}! {err}", event.header.serial_number);
              }
            }
            progress.inc(1);
          }
        }
        consumer.release(slot);
        match thread_control.lock() {
          Ok(mut tc) => tc.n_events_processed = n_events,
          Err(err)   => error!("Can't acquire lock for ThreadControl! {err}"),
        }
      }
      Err(QueueError::Timeout) => {
        // the readout might still publish while it is alive
        let done = match thread_control.lock() {
          Ok(tc) => (tc.stop_flag || tc.event_limit_reached()) && !tc.thread_readout_active,
          Err(err) => {
            error!("Can't acquire lock for ThreadControl! {err}");
            true
          }
        };
        if done && consumer.n_pending() == 0 {
          break;
        }
      }
      Err(QueueError::Disconnected) => {
        debug!("Readout is gone, ending data sink!");
        break;
      }
    }
  }
  progress.finish();
  if let Some(w) = &mut writer {
    if let Err(err) = w.flush() {
      error!("Unable to flush event file! {err}");
    }
  }
  if n_broken > 0 {
    warn!("Received {} broken events!", n_broken);
  }
  info!("Data sink received {} events", n_events);
  match thread_control.lock() {
    Ok(mut tc) => tc.thread_data_sink_active = false,
    Err(err)   => error!("Can't acquire lock for ThreadControl! {err}"),
  }
  n_events
}
