//! Bounded byte ring buffers sitting between interrupt-time byte transport and the control loop.

use core::cell::RefCell;

use critical_section::Mutex;

/// Default capacity of one direction of a serial port.
pub const DEFAULT_CAPACITY: usize = 64;

/// Byte queue operations used by the framer and the reply writer.
///
/// None of these block. Pushing into a full queue drops the byte.
pub trait ByteQueue {
    /// Number of unread bytes.
    fn available(&self) -> usize;

    /// Number of bytes that can still be pushed.
    fn writable_space(&self) -> usize;

    /// Append a byte, silently dropping it if the queue is full.
    fn push(&mut self, byte: u8);

    /// Remove and return the oldest byte.
    fn pop(&mut self) -> Option<u8>;

    /// Look at the byte `distance` positions behind the read position.
    ///
    /// Returns `0x00` if fewer than `distance + 1` bytes are available.
    fn peek(&self, distance: usize) -> u8;

    /// Drop `count` bytes from the front. `count` must not exceed [`ByteQueue::available`].
    fn discard(&mut self, count: usize);

    /// Push every byte of `bytes`, dropping whatever does not fit.
    fn push_all(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push(byte);
        }
    }
}

/// Fixed-capacity circular byte buffer.
///
/// One slot is kept free to tell a full buffer from an empty one, so `N - 1` bytes are usable.
/// `head` only moves on write, `tail` only on read or discard.
pub struct FrameBuffer<const N: usize = DEFAULT_CAPACITY> {
    buffer: [u8; N],
    head: usize,
    tail: usize,
}

impl<const N: usize> Default for FrameBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FrameBuffer<N> {
    /// Creates a new, empty buffer.
    ///
    /// This is declared const, allowing it to be used in `static` contexts.
    pub const fn new() -> Self {
        Self {
            buffer: [0u8; N],
            head: 0,
            tail: 0,
        }
    }

    /// Reset both indices, dropping any content.
    pub fn init(&mut self) {
        self.head = 0;
        self.tail = 0;
    }

    /// Usable capacity.
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        (self.head + 1) % N == self.tail
    }
}

impl<const N: usize> ByteQueue for FrameBuffer<N> {
    fn available(&self) -> usize {
        if self.head >= self.tail {
            self.head - self.tail
        } else {
            (N - self.tail) + self.head
        }
    }

    fn writable_space(&self) -> usize {
        N - self.available() - 1
    }

    fn push(&mut self, byte: u8) {
        if self.is_full() {
            return;
        }
        self.buffer[self.head] = byte;
        self.head = (self.head + 1) % N;
    }

    fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.buffer[self.tail];
        self.tail = (self.tail + 1) % N;
        Some(byte)
    }

    fn peek(&self, distance: usize) -> u8 {
        if distance >= self.available() {
            return 0x00;
        }
        self.buffer[(self.tail + distance) % N]
    }

    fn discard(&mut self, count: usize) {
        let count = count.min(self.available());
        self.tail = (self.tail + count) % N;
    }
}

/// A [`FrameBuffer`] shared between an interrupt handler and the control loop.
///
/// Every operation runs inside its own critical section, so the head/tail pair is never observed
/// half updated. Use [`SharedFrameBuffer::with`] to group several operations atomically.
pub struct SharedFrameBuffer<const N: usize = DEFAULT_CAPACITY> {
    inner: Mutex<RefCell<FrameBuffer<N>>>,
}

impl<const N: usize> Default for SharedFrameBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SharedFrameBuffer<N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(FrameBuffer::new())),
        }
    }

    /// Run `f` on the buffer with interrupts masked.
    pub fn with<R>(&self, f: impl FnOnce(&mut FrameBuffer<N>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }

    /// Interrupt-side receive: store one byte, dropping it if the buffer is full.
    pub fn push(&self, byte: u8) {
        self.with(|buf| buf.push(byte))
    }

    /// Interrupt-side transmit: fetch the next byte to shift out.
    pub fn pop(&self) -> Option<u8> {
        self.with(|buf| buf.pop())
    }

    pub fn available(&self) -> usize {
        self.with(|buf| buf.available())
    }
}

impl<const N: usize> ByteQueue for &SharedFrameBuffer<N> {
    fn available(&self) -> usize {
        self.with(|buf| buf.available())
    }

    fn writable_space(&self) -> usize {
        self.with(|buf| buf.writable_space())
    }

    fn push(&mut self, byte: u8) {
        self.with(|buf| buf.push(byte))
    }

    fn pop(&mut self) -> Option<u8> {
        self.with(|buf| buf.pop())
    }

    fn peek(&self, distance: usize) -> u8 {
        self.with(|buf| buf.peek(distance))
    }

    fn discard(&mut self, count: usize) {
        self.with(|buf| buf.discard(count))
    }

    fn push_all(&mut self, bytes: &[u8]) {
        self.with(|buf| buf.push_all(bytes))
    }
}
