//! Byte links and the receive path
//!
//! A [`Transport`] is a polled, byte-wide link, the shape of a UART data
//! register. Publishing goes through a [`FragmentSink`]; [`SharedLink`] is
//! the usual one, serializing whole frames onto a transport so frames from
//! different tasks never interleave. On the receive side a [`Receiver`]
//! owns the frame decoder, applies finished fragments to a
//! [`KnowledgeCache`] and contains every error: a bad frame is logged,
//! counted and dropped, and reception carries on.

use core::fmt;

use heapless::Deque;
use mutex::{BlockingMutex, ConstInit, ScopedRawMutex};

use crate::{
    cache::{Applied, KnowledgeCache, ProtocolViolation},
    fragment::{FragmentDump, KnowledgeFragment},
    knowledge::Schema,
    logging::{debug, trace, warn},
    wire_frames::{DecodeError, FrameDecoder, write_frame},
};

/// A polled byte link.
pub trait Transport {
    /// Whether [`send`](Self::send) would accept a byte now.
    fn can_send(&self) -> bool;

    fn send(&mut self, byte: u8);

    /// How many bytes [`send`](Self::send) would take right now without
    /// waiting, if the link knows. Lets writers refuse a frame that cannot
    /// go out whole.
    fn send_room(&self) -> Option<usize> {
        None
    }

    /// Whether a received byte is waiting.
    fn can_recv(&self) -> bool;

    /// Take the next received byte. Only meaningful after
    /// [`can_recv`](Self::can_recv) said yes.
    fn recv(&mut self) -> u8;
}

/// Somewhere fragments can be published to.
pub trait FragmentSink {
    fn send_fragment(&self, frag: &KnowledgeFragment) -> Result<(), SendError>;
}

#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SendError {
    /// The sink has no room right now. The fragment was not sent.
    Full,
    /// The other end is gone.
    Closed,
}

/// A transport shared by every publisher on a node.
///
/// Each fragment is written as one frame while the link is locked.
pub struct SharedLink<R: ScopedRawMutex, T> {
    link: BlockingMutex<R, T>,
}

/// In-memory link: what is sent is what is received, in order.
///
/// When the buffer is full, `can_send` says no and `send` drops the byte.
pub struct Loopback<const N: usize> {
    buf: Deque<u8, N>,
}

/// Counters kept by a [`Receiver`].
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxStats {
    /// Fragments applied to the cache.
    pub applied: u32,
    /// Frames the decoder dropped.
    pub malformed: u32,
    /// Decoded fragments the cache refused.
    pub rejected: u32,
}

/// Why a received frame did not reach the cache.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxError {
    Decode(DecodeError),
    Protocol(ProtocolViolation),
}

/// The receive path of a node: link bytes in, cache updates out.
pub struct Receiver<'c, R: ScopedRawMutex, const N: usize, const S: usize> {
    cache: &'c KnowledgeCache<R, N, S>,
    decoder: FrameDecoder<'static, [Schema]>,
    stats: RxStats,
}

// ---- impl SharedLink ----

impl<R: ScopedRawMutex + ConstInit, T> SharedLink<R, T> {
    pub const fn new(link: T) -> Self {
        Self {
            link: BlockingMutex::new(link),
        }
    }
}

impl<R: ScopedRawMutex, T> SharedLink<R, T> {
    pub const fn const_new(r: R, link: T) -> Self {
        Self {
            link: BlockingMutex::const_new(r, link),
        }
    }

    /// Run `f` with the link locked, e.g. to drain received bytes.
    pub fn with_link<U, F: FnOnce(&mut T) -> U>(&self, f: F) -> U {
        self.link.with_lock(f)
    }
}

impl<R: ScopedRawMutex, T: Transport> FragmentSink for SharedLink<R, T> {
    fn send_fragment(&self, frag: &KnowledgeFragment) -> Result<(), SendError> {
        self.link.with_lock(|link| write_frame(frag, link))
    }
}

// ---- impl Loopback ----

impl<const N: usize> Loopback<N> {
    pub const fn new() -> Self {
        Self { buf: Deque::new() }
    }

    /// Bytes sent but not yet received.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

impl<const N: usize> Default for Loopback<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Transport for Loopback<N> {
    fn can_send(&self) -> bool {
        !self.buf.is_full()
    }

    fn send(&mut self, byte: u8) {
        if self.buf.push_back(byte).is_err() {
            trace!("loopback full, dropping byte");
        }
    }

    fn send_room(&self) -> Option<usize> {
        Some(N - self.buf.len())
    }

    fn can_recv(&self) -> bool {
        !self.buf.is_empty()
    }

    fn recv(&mut self) -> u8 {
        self.buf.pop_front().unwrap_or(0)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn can_send(&self) -> bool {
        (**self).can_send()
    }

    fn send(&mut self, byte: u8) {
        (**self).send(byte)
    }

    fn send_room(&self) -> Option<usize> {
        (**self).send_room()
    }

    fn can_recv(&self) -> bool {
        (**self).can_recv()
    }

    fn recv(&mut self) -> u8 {
        (**self).recv()
    }
}

// ---- impl Receiver ----

impl<'c, R: ScopedRawMutex, const N: usize, const S: usize> Receiver<'c, R, N, S> {
    /// A receiver feeding `cache`, decoding against the cache's schemas.
    pub fn new(cache: &'c KnowledgeCache<R, N, S>) -> Self {
        Self {
            cache,
            decoder: FrameDecoder::new(cache.schemas()),
            stats: RxStats::default(),
        }
    }

    /// Feed one received byte, timestamped in the cache's time base.
    ///
    /// Returns the outcome when a frame finished. Errors are already logged
    /// and counted, so callers are free to ignore the result.
    pub fn on_byte(&mut self, byte: u8, now_ms: u64) -> Option<Result<Applied, RxError>> {
        let res = match self.decoder.feed(byte)? {
            Ok(frag) => self.deliver(&frag, now_ms),
            Err(e) => {
                self.stats.malformed += 1;
                debug!("rx: dropped frame: {}", e);
                Err(RxError::Decode(e))
            }
        };
        Some(res)
    }

    /// Drain every byte `link` has waiting. Returns how many were read.
    pub fn poll<T: Transport + ?Sized>(&mut self, link: &mut T, now_ms: u64) -> usize {
        let mut read = 0;
        while link.can_recv() {
            let byte = link.recv();
            read += 1;
            let _ = self.on_byte(byte, now_ms);
        }
        read
    }

    /// The link closed or was reset. Any partial frame is dropped.
    pub fn link_closed(&mut self) {
        if self.decoder.abort() {
            self.stats.malformed += 1;
        }
    }

    pub fn stats(&self) -> RxStats {
        self.stats
    }

    fn deliver(&mut self, frag: &KnowledgeFragment, now_ms: u64) -> Result<Applied, RxError> {
        match self.cache.apply(frag, now_ms) {
            Ok(applied) => {
                self.stats.applied += 1;
                Ok(applied)
            }
            Err(e) => {
                self.stats.rejected += 1;
                warn!("rx: refused fragment: {}", e);
                debug!("rx: {}", FragmentDump(frag));
                Err(RxError::Protocol(e))
            }
        }
    }
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Full => f.write_str("sink full"),
            SendError::Closed => f.write_str("sink closed"),
        }
    }
}

impl core::error::Error for SendError {}

impl fmt::Display for RxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RxError::Decode(e) => write!(f, "decode: {e}"),
            RxError::Protocol(e) => write!(f, "protocol: {e}"),
        }
    }
}

impl core::error::Error for RxError {}
