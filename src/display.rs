//! The status display port.
//!
//! A readout device polls with a single `q` byte and gets back one unframed line with every
//! measurement:
//!
//! `<v1>:<a1>:<v2>:<a2>:<v3>:<a3>:<v4>:<a4>:<filament set>:<filament mA>\r\n`

use crate::channel::Channel;
use crate::controller::Controller;
use crate::frame_buffer::ByteQueue;
use crate::hal::Board;
use crate::protocol::write_line;
use crate::transport::Transport;

/// The byte a display sends to request a status line.
pub const STATUS_REQUEST: u8 = b'q';

impl<B: Board> Controller<B> {
    /// Answer pending status requests on a display port.
    ///
    /// Consumes everything received so far and writes one status line per `q`.
    pub fn serve_display<T: Transport>(&self, port: &mut T) {
        let mut requests = 0usize;
        while let Some(byte) = port.rx().pop() {
            if byte == STATUS_REQUEST {
                requests += 1;
            }
        }
        if requests == 0 {
            return;
        }

        let [v1, v2, v3, v4] = Channel::ALL.map(|ch| self.measured_volts(ch));
        let [a1, a2, a3, a4] = Channel::ALL.map(|ch| self.measured_current(ch));
        let filament_set = self.filament().output_current;
        let filament_ma = self.filament_milliamps();
        for _ in 0..requests {
            write_line(
                port.tx(),
                format_args!(
                    "{}:{}:{}:{}:{}:{}:{}:{}:{}:{}",
                    v1, a1, v2, a2, v3, a3, v4, a4, filament_set, filament_ma
                ),
            );
        }
        port.start_transmit();
    }
}
