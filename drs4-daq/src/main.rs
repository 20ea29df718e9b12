//! DRS4 frontend
//!
//! Configures the board, then runs the acquisition 
//! driver and the data sink in their own threads 
//! until the requested number of events is taken or
//! the program is interrupted.

#[macro_use] extern crate log;

use std::path::{
    Path,
    PathBuf,
};
use std::process::exit;
use std::sync::{
    Arc,
    Mutex,
};
use std::sync::atomic::{
    AtomicBool,
    Ordering,
};
use std::thread;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use signal_hook::consts::{
    SIGINT,
    SIGTERM,
};

use drs4_dataclasses::CalibrationTable;

use drs4_daq::init_env_logger;
use drs4_daq::board::{
    Board,
    open_board,
};
use drs4_daq::ring::event_ring;
use drs4_daq::settings::DaqSettings;
use drs4_daq::thread_control::ThreadControl;
use drs4_daq::threads::{
    AcquisitionDriver,
    data_sink,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
  /// Configuration file (.toml or .json). Defaults 
  /// are used if not given.
  #[arg(short, long)]
  config: Option<PathBuf>,
  /// Write the configuration which would be used 
  /// to this file (.toml, or .json by extension) and exit
  #[arg(long)]
  write_config: Option<String>,
  /// Use the simulated board instead of hardware
  #[arg(long, default_value_t = false)]
  simulate: bool,
  /// Acquire this many events. Run until interrupted if 0
  #[arg(short, long, default_value_t = 0)]
  nevents: u64,
  /// Save the published bank events to this file
  #[arg(short, long)]
  output: Option<PathBuf>,
  /// Save the raw captures in the binary format 
  /// (overrides the config file)
  #[arg(short, long)]
  record: Option<String>,
  /// Print all waveforms to stdout
  #[arg(long, default_value_t = false)]
  dump: bool,
  /// Show a progress bar with the number of events
  #[arg(long, default_value_t = false)]
  show_progress: bool,
}

fn main() {
  init_env_logger();
  let args = Args::parse();

  let mut settings = match &args.config {
    None => DaqSettings::new(),
    Some(path) => {
      let loaded = if path.extension().is_some_and(|ext| ext == "json") {
        DaqSettings::from_json(path.display().to_string())
      } else {
        DaqSettings::from_toml(path.display().to_string())
      };
      match loaded {
        Err(err) => {
          error!("Unable to load settings from {}! {err}", path.display());
          exit(1);
        }
        Ok(s) => s
      }
    }
  };
  if args.record.is_some() {
    settings.readout.record_file = args.record.clone();
  }
  if args.dump {
    settings.readout.dump_waveforms = true;
  }
  if let Some(fname) = args.write_config {
    if fname.ends_with(".json") {
      settings.to_json(fname);
    } else {
      settings.to_toml(fname);
    }
    exit(0);
  }
  info!("Using {}", settings);

  let mut board = match open_board(args.simulate) {
    Err(err) => {
      println!("{} {}", "No board found!".red().bold(), err);
      exit(1);
    }
    Ok(b) => b
  };
  if let Err(err) = board.configure(&settings.board) {
    error!("Unable to configure board #{}! {err}", board.serial_number());
    exit(1);
  }
  println!("==> Board #{} configured, firmware {}", board.serial_number(), board.firmware_version());

  let fallback = match &settings.readout.fallback_calibration {
    None => None,
    Some(fname) => {
      match CalibrationTable::from_file(Path::new(fname)) {
        Err(err) => {
          error!("Unable to load fallback calibration {}! {err}", fname);
          exit(1);
        }
        Ok(table) => Some(table)
      }
    }
  };

  let (ring, consumer) = event_ring(settings.readout.n_slots, settings.readout.slot_size);
  let mut driver = match AcquisitionDriver::new(board, ring, settings.readout.clone(), fallback) {
    Err(err) => {
      error!("Unable to set up the acquisition! {err}");
      exit(1);
    }
    Ok(d) => d
  };

  let mut tc = ThreadControl::new();
  tc.max_events = args.nevents;
  tc.run_active = true;
  let thread_control = Arc::new(Mutex::new(tc));

  let interrupted = Arc::new(AtomicBool::new(false));
  for sig in [SIGINT, SIGTERM] {
    if let Err(err) = signal_hook::flag::register(sig, Arc::clone(&interrupted)) {
      error!("Unable to register signal handler! {err}");
    }
  }

  let tc_sink     = Arc::clone(&thread_control);
  let output      = args.output.clone();
  let show_progress = args.show_progress;
  let sink = thread::Builder::new()
    .name("data-sink".into())
    .spawn(move || {
      data_sink(consumer, tc_sink, output, show_progress)
    });
  let tc_readout = Arc::clone(&thread_control);
  let readout = thread::Builder::new()
    .name("readout".into())
    .spawn(move || {
      driver.run(&tc_readout)
    });
  let (sink, readout) = match (sink, readout) {
    (Ok(s), Ok(r)) => (s, r),
    _ => {
      error!("Unable to spawn threads!");
      exit(1);
    }
  };
  println!("==> All threads initialized!");

  let one_tenth = Duration::from_millis(100);
  loop {
    thread::sleep(one_tenth);
    let readout_done = readout.is_finished();
    if interrupted.load(Ordering::Relaxed) || readout_done {
      if !readout_done {
        println!("==> \u{1F6D1} received signal, ending the run!");
      }
      match thread_control.lock() {
        Ok(mut tc) => {
          tc.run_active = false;
          tc.stop_flag  = true;
        }
        Err(err) => error!("Can't acquire lock for ThreadControl! {err}"),
      }
      break;
    }
  }
  let mut exit_code = 0;
  match readout.join() {
    Err(_)        => {
      error!("Readout thread panicked!");
      exit_code = 1;
    }
    Ok(Err(err))  => {
      error!("Readout failed! {err}");
      exit_code = 1;
    }
    Ok(Ok(_))     => ()
  }
  match sink.join() {
    Err(_)       => error!("Data sink thread panicked!"),
    Ok(n_events) => println!("==> Received {} events", n_events),
  }
  exit(exit_code);
}
