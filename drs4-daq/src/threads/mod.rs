//! Threads of the frontend 
//!
//! * readout   - drives the board through the acquisition 
//!               cycle and publishes decoded events
//! * data_sink - consumes the published events

pub mod readout;
pub mod data_sink;

pub use readout::{
    AcquisitionDriver,
    DriverState,
    DriverStatistics,
};
pub use data_sink::data_sink;
