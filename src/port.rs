use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::time::Duration;

use crate::cli::SerialOpts;
use crate::error::PumpError;

/// Short read timeout so the dispatcher loop notices a close promptly.
pub const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Open the pump port: 8 data bits, no parity, two stop bits.
pub fn open_port(opts: &SerialOpts) -> Result<Box<dyn SerialPort>, PumpError> {
    let builder = serialport::new(&opts.dev, opts.baud)
        .timeout(READ_TIMEOUT)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::Two)
        .flow_control(FlowControl::None);

    builder.open().map_err(|source| PumpError::Open {
        port: opts.dev.clone(),
        source,
    })
}
