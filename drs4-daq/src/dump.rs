//! Text representation of decoded waveforms
//!
//! One column pair per channel, time in ns and 
//! voltage in mV, one line per sample.

use std::io::Write;

use drs4_dataclasses::DecodedEvent;

/// Column header, e.g. "t1[ns] u1[mV] t2[ns] u2[mV]"
pub fn header_line(event : &DecodedEvent) -> String {
  let cols : Vec<String> = event.traces().iter()
    .map(|tr| format!("t{ch}[ns] u{ch}[mV]", ch = tr.channel))
    .collect();
  cols.join(" ")
}

/// Write all samples of an event, preceded by 
/// the column header
pub fn write_waveforms<W : Write>(event : &DecodedEvent, writer : &mut W) -> std::io::Result<()> {
  writeln!(writer, "{}", header_line(event))?;
  let nsamples = event.traces().iter().map(|tr| tr.voltages.len()).min().unwrap_or(0);
  for k in 0..nsamples {
    let cols : Vec<String> = event.traces().iter()
      .map(|tr| format!("{:.3} {:.1}", tr.nanoseconds[k], tr.voltages[k]*1000.0))
      .collect();
    writeln!(writer, "{}", cols.join(" "))?;
  }
  Ok(())
}
