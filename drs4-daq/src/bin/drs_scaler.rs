//! Print the scalers of the four front panel 
//! inputs, or -1 if there is no board
//!

use clap::Parser;

use drs4_daq::init_env_logger;
use drs4_daq::board::{
    open_board,
    read_scalers,
};

#[derive(Parser, Default, Debug)]
#[command(version, about, long_about = None)]
struct Args {
  /// Use the simulated board instead of hardware
  #[arg(long, default_value_t = false)]
  simulate: bool,
}

fn main() {
  init_env_logger();
  let args    = Args::parse();
  let board   = open_board(args.simulate).ok();
  let scalers = read_scalers(board.as_ref());
  println!("{} {} {} {}", scalers[0], scalers[1], scalers[2], scalers[3]);
}
