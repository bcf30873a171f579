//! Byte transports the controller talks through.
//!
//! A command port is a pair of [`ByteQueue`]s plus a way to start transmission. On the target the
//! queues are [`SharedFrameBuffer`]s filled and drained by the UART interrupts
//! ([`InterruptPort`]). On a host, [`BufferedPort`] pumps any `embedded-io` device through plain
//! [`FrameBuffer`]s.
//!
//! ```
//! use electronctrl::{ByteQueue, InterruptPort, SharedFrameBuffer, Transport};
//!
//! static RX: SharedFrameBuffer = SharedFrameBuffer::new();
//! static TX: SharedFrameBuffer = SharedFrameBuffer::new();
//!
//! // Receive interrupt.
//! RX.push(b'$');
//!
//! let mut port = InterruptPort::new(&RX, &TX, || { /* enable the transmit-ready interrupt */ });
//! assert_eq!(port.rx().pop(), Some(b'$'));
//! port.tx().push(b'x');
//! port.start_transmit();
//!
//! // Transmit-ready interrupt, which disables itself once `pop` returns `None`.
//! assert_eq!(TX.pop(), Some(b'x'));
//! assert_eq!(TX.pop(), None);
//! ```

use embedded_io::Error as _;

use crate::error::{Error, Result};
use crate::frame_buffer::{ByteQueue, DEFAULT_CAPACITY, FrameBuffer, SharedFrameBuffer};

/// A duplex byte channel carrying the framed protocol.
pub trait Transport {
    type Rx: ByteQueue;
    type Tx: ByteQueue;

    /// Bytes received and not yet consumed.
    fn rx(&mut self) -> &mut Self::Rx;

    /// Bytes waiting to be sent.
    fn tx(&mut self) -> &mut Self::Tx;

    /// Make sure queued transmit data starts moving. Must not block.
    fn start_transmit(&mut self);
}

/// Primes a transmitter, usually by enabling its data-register-empty interrupt.
pub trait TransmitKick {
    fn kick(&mut self);
}

impl<F: FnMut()> TransmitKick for F {
    fn kick(&mut self) {
        self()
    }
}

/// A [`Transport`] over interrupt-fed shared buffers.
pub struct InterruptPort<'a, const N: usize, K: TransmitKick> {
    rx: &'a SharedFrameBuffer<N>,
    tx: &'a SharedFrameBuffer<N>,
    kick: K,
}

impl<'a, const N: usize, K: TransmitKick> InterruptPort<'a, N, K> {
    pub fn new(rx: &'a SharedFrameBuffer<N>, tx: &'a SharedFrameBuffer<N>, kick: K) -> Self {
        Self { rx, tx, kick }
    }
}

impl<'a, const N: usize, K: TransmitKick> Transport for InterruptPort<'a, N, K> {
    type Rx = &'a SharedFrameBuffer<N>;
    type Tx = &'a SharedFrameBuffer<N>;

    fn rx(&mut self) -> &mut Self::Rx {
        &mut self.rx
    }

    fn tx(&mut self) -> &mut Self::Tx {
        &mut self.tx
    }

    fn start_transmit(&mut self) {
        if self.tx.available() > 0 {
            self.kick.kick();
        }
    }
}

/// Bytes moved per `read`/`write` call.
const CHUNK: usize = 16;

/// You can create a BufferedPort using any interface which implements [embedded_io::Read] &
/// [embedded_io::Write].
///
/// This is the polled counterpart of [`InterruptPort`]: call [`BufferedPort::pump`] once per
/// loop iteration to move bytes between the device and the queues. Reads are expected to time out
/// or report would-block when no data is pending.
pub struct BufferedPort<S: embedded_io::Read + embedded_io::Write, const N: usize = DEFAULT_CAPACITY>
{
    interface: S,
    rx: FrameBuffer<N>,
    tx: FrameBuffer<N>,
}

impl<S: embedded_io::Read + embedded_io::Write, const N: usize> BufferedPort<S, N> {
    pub fn new(interface: S) -> Self {
        Self {
            interface,
            rx: FrameBuffer::new(),
            tx: FrameBuffer::new(),
        }
    }

    pub fn interface(&mut self) -> &mut S {
        &mut self.interface
    }

    pub fn into_inner(self) -> S {
        self.interface
    }

    /// Receive what the device has pending, then send what is queued.
    pub fn pump(&mut self) -> Result<(), S::Error> {
        self.receive()?;
        self.transmit()
    }

    fn receive(&mut self) -> Result<(), S::Error> {
        let mut temp_buf = [0u8; CHUNK];
        loop {
            let space = self.rx.writable_space().min(CHUNK);
            if space == 0 {
                return Ok(());
            }
            match self.interface.read(&mut temp_buf[..space]) {
                Ok(0) => return Ok(()),
                Ok(bytes_read) => self.rx.push_all(&temp_buf[..bytes_read]),
                Err(e) => {
                    // Nothing more pending right now.
                    if matches!(
                        e.kind(),
                        embedded_io::ErrorKind::Other
                            | embedded_io::ErrorKind::TimedOut
                            | embedded_io::ErrorKind::Interrupted
                    ) {
                        return Ok(());
                    }
                    return Err(Error::Interface(e));
                }
            }
        }
    }

    fn transmit(&mut self) -> Result<(), S::Error> {
        let mut temp_buf = [0u8; CHUNK];
        while self.tx.available() > 0 {
            let len = self.tx.available().min(CHUNK);
            for (i, byte) in temp_buf[..len].iter_mut().enumerate() {
                *byte = self.tx.peek(i);
            }
            let written = self.interface.write(&temp_buf[..len]).map_err(Error::Interface)?;
            if written == 0 {
                return Err(Error::WriteZero);
            }
            self.tx.discard(written);
        }
        self.interface.flush().map_err(Error::Interface)
    }
}

impl<S: embedded_io::Read + embedded_io::Write, const N: usize> Transport for BufferedPort<S, N> {
    type Rx = FrameBuffer<N>;
    type Tx = FrameBuffer<N>;

    fn rx(&mut self) -> &mut Self::Rx {
        &mut self.rx
    }

    fn tx(&mut self) -> &mut Self::Tx {
        &mut self.tx
    }

    /// Transmission happens in [`BufferedPort::pump`].
    fn start_transmit(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_serial::{MockSerial, MockSerialError};

    #[test]
    fn pump_moves_bytes_both_ways() {
        let mut serial = MockSerial::new();
        serial.set_read_data(b"$$$id\n").unwrap();
        serial.set_read_chunk(2);

        let mut port: BufferedPort<MockSerial> = BufferedPort::new(serial);
        port.tx().push_all(b"$$$err\n");
        port.pump().unwrap();

        assert_eq!(port.rx().available(), 6);
        assert_eq!(port.rx().peek(3), b'i');
        assert_eq!(port.tx().available(), 0);
        assert_eq!(port.interface().written_data(), b"$$$err\n");
    }

    #[test]
    fn receive_stops_when_queue_is_full() {
        let mut serial = MockSerial::new();
        serial.set_read_data(&[b'a'; 40]).unwrap();
        let mut port: BufferedPort<MockSerial, 16> = BufferedPort::new(serial);

        port.pump().unwrap();
        assert_eq!(port.rx().available(), 15);

        // The rest stays in the device until there is room.
        port.rx().discard(15);
        port.pump().unwrap();
        assert_eq!(port.rx().available(), 15);
    }

    #[test]
    fn hard_errors_are_propagated() {
        let mut serial = MockSerial::new();
        serial.set_read_error(true);
        let mut port: BufferedPort<MockSerial> = BufferedPort::new(serial);
        assert!(matches!(
            port.pump(),
            Err(Error::Interface(MockSerialError::SimulatedError))
        ));

        port.interface().set_read_error(false);
        port.interface().set_write_error(true);
        port.tx().push(b'x');
        assert!(matches!(
            port.pump(),
            Err(Error::Interface(MockSerialError::SimulatedError))
        ));
        // Nothing was lost.
        assert_eq!(port.tx().available(), 1);
    }

    #[test]
    fn interrupt_port_kicks_only_with_pending_data() {
        static RX: SharedFrameBuffer<8> = SharedFrameBuffer::new();
        static TX: SharedFrameBuffer<8> = SharedFrameBuffer::new();

        let mut kicks = 0;
        {
            let mut port = InterruptPort::new(&RX, &TX, || kicks += 1);
            port.start_transmit();
            port.tx().push_all(b"ok");
            port.start_transmit();
        }
        assert_eq!(kicks, 1);
        assert_eq!(TX.pop(), Some(b'o'));
        assert_eq!(TX.pop(), Some(b'k'));
        assert_eq!(RX.available(), 0);
    }
}
