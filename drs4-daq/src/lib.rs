//! Readout of the DRS4 evaluation board
//!
//! The live path polls the board, decodes every capture with 
//! the timing calibration queried from the board and publishes
//! the decoded traces as banks into a bounded event ring. 
//!
//! * errors        - queue, board and driver failures
//! * board         - the `Board` abstraction and a simulated board
//! * ring          - bounded ring of event slots (acquire, publish, release)
//! * banks         - bank format of the published events
//! * settings      - configuration, stored as toml
//! * dump          - waveforms as text columns
//! * threads       - readout driver and data sink

#[macro_use] extern crate log;

pub mod errors;
pub mod board;
pub mod ring;
pub mod banks;
pub mod settings;
pub mod dump;
pub mod thread_control;
pub mod threads;

pub use settings::DaqSettings;
pub use thread_control::ThreadControl;

use std::io::Write;

use colored::{Colorize, ColoredString};
use log::Level;

/// Make sure that the loglevel is in color, even though not using pretty_env logger
pub fn color_log(level : &Level) -> ColoredString {
  match level {
    Level::Error    => String::from(" ERROR!").red(),
    Level::Warn     => String::from(" WARN  ").yellow(),
    Level::Info     => String::from(" Info  ").green(),
    Level::Debug    => String::from(" debug ").blue(),
    Level::Trace    => String::from(" trace ").cyan(),
  }
}

/// Set up the environmental (env) logger
/// with our format
///
/// Ensure that the lines and module paths
/// are printed in the logging output
pub fn init_env_logger() {
  env_logger::builder()
    .format(|buf, record| {
    writeln!( buf, "[{level}][{module_path}:{line}] {args}",
      level = color_log(&record.level()),
      module_path = record.module_path().unwrap_or("<unknown>"),
      line = record.line().unwrap_or(0),
      args = record.args()
      )
    }).init();
}
