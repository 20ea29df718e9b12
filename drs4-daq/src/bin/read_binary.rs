//! Decode binary capture files written by the 
//! DRS4 evaluation board software
//!

#[macro_use] extern crate log;

use std::fs::File;
use std::io::{
    BufWriter,
    Write,
};
use std::path::{
    Path,
    PathBuf,
};
use std::process::exit;
use std::sync::Arc;

use clap::Parser;
use glob::glob;
use indicatif::{
    ProgressBar,
    ProgressStyle,
};

use drs4_dataclasses::{
    CalibrationTable,
    Decoder,
    MissingCalibrationPolicy,
    VoltageRange,
};
use drs4_dataclasses::io::DrsFileReader;

use drs4_daq::init_env_logger;
use drs4_daq::dump::write_waveforms;

#[derive(Parser, Default, Debug)]
#[command(version, about, long_about = None)]
struct Args {
  /// Input file(s), glob patterns are allowed
  input: String,
  /// Stop after this many events per file (0 for all)
  #[arg(short, long, default_value_t = 0)]
  nevents: usize,
  /// Do not align the channels, keep the 
  /// trigger cell relative time axes
  #[arg(long, default_value_t = false)]
  no_align: bool,
  /// Write the decoded events as json, one event per line
  #[arg(short, long)]
  json: Option<PathBuf>,
  /// Print the waveforms as text columns 
  #[arg(long, default_value_t = false)]
  dump: bool,
  /// Calibration table for channels which are 
  /// not calibrated in the file
  #[arg(long)]
  fallback_calibration: Option<PathBuf>,
  /// Centre of the input range the data was taken with (V)
  #[arg(long, default_value_t = 0.0)]
  input_range_center: f64,
  #[arg(long, default_value_t = false)]
  show_progress: bool,
}

fn main() {
  init_env_logger();
  let args = Args::parse();

  let mut files = Vec::<PathBuf>::new();
  match glob(&args.input) {
    Err(err) => {
      error!("Invalid pattern {}! {err}", args.input);
      exit(1);
    }
    Ok(entries) => {
      for entry in entries {
        match entry {
          Err(err) => error!("Can not access file! {err}"),
          Ok(path) => files.push(path),
        }
      }
    }
  }
  if files.is_empty() {
    println!("=> No files match {}!", args.input);
    exit(1);
  }
  files.sort();

  let fallback = match &args.fallback_calibration {
    None => None,
    Some(fname) => {
      match CalibrationTable::from_file(fname) {
        Err(err) => {
          error!("Unable to load calibration {}! {err}", fname.display());
          exit(1);
        }
        Ok(table) => Some(Arc::new(table))
      }
    }
  };

  let mut json_out = match &args.json {
    None => None,
    Some(fname) => {
      match File::create(fname) {
        Err(err) => {
          error!("Unable to open {}! {err}", fname.display());
          exit(1);
        }
        Ok(f) => Some(BufWriter::new(f))
      }
    }
  };

  let template_bar = "[{elapsed_precise}] {prefix} {msg} {spinner} {pos:>7} events";
  let mut n_total   = 0usize;
  let mut n_failed  = 0usize;
  for fname in &files {
    let mut reader = match DrsFileReader::new(fname) {
      Err(err) => {
        error!("Unable to read {}! {err}", fname.display());
        continue;
      }
      Ok(r) => r
    };
    println!("=> {}", reader);
    if let Err(err) = reader.calibration().validate() {
      warn!("Calibration in {} looks suspicious! {err}", fname.display());
    }
    let mut decoder = Decoder::new(Arc::new(reader.calibration().clone()), 
                                   VoltageRange::from_center(args.input_range_center));
    decoder.align = !args.no_align;
    if let Some(fb) = &fallback {
      decoder.policy = MissingCalibrationPolicy::UseFallback;
      decoder = decoder.with_fallback(Arc::clone(fb));
    }
    
    let bar = if args.show_progress {
      ProgressBar::new_spinner()
    } else {
      ProgressBar::hidden()
    };
    bar.set_style(ProgressStyle::with_template(template_bar)
                  .unwrap_or_else(|_| ProgressStyle::default_spinner()));
    bar.set_prefix(file_name(fname));
    
    let mut n_events = 0usize;
    for capture in reader.by_ref() {
      if args.nevents > 0 && n_events >= args.nevents {
        break;
      }
      n_events += 1;
      bar.inc(1);
      let event = match decoder.decode(&capture) {
        Err(err) => {
          n_failed += 1;
          warn!("Can not decode event {}! {err}", capture.meta.event_id);
          continue;
        }
        Ok(ev) => ev
      };
      if args.dump {
        println!("Event #{}, trigger cell {}", event.meta().event_id, event.trigger_cell());
        let stdout = std::io::stdout();
        if let Err(err) = write_waveforms(&event, &mut stdout.lock()) {
          error!("Unable to dump event! {err}");
        }
      }
      if let Some(out) = &mut json_out {
        let written = serde_json::to_writer(&mut *out, &event)
          .map_err(|e| e.to_string())
          .and_then(|_| out.write_all(b"\n").map_err(|e| e.to_string()));
        if let Err(err) = written {
          error!("Unable to write event {}! {err}", event.meta().event_id);
        }
      }
    }
    bar.finish();
    n_total += n_events;
    println!("=> {} events in {}", n_events, fname.display());
  }
  if let Some(out) = &mut json_out {
    if let Err(err) = out.flush() {
      error!("Unable to flush json output! {err}");
    }
  }
  println!("=> Processed {} events in {} files, {} could not be decoded", n_total, files.len(), n_failed);
}

fn file_name(path : &Path) -> String {
  path.file_name()
    .map(|n| n.to_string_lossy().to_string())
    .unwrap_or_default()
}
