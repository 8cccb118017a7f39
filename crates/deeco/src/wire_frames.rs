//! Serial wire format
//!
//! Fragments travel as printable ASCII so a link can be watched, or fed by
//! hand, from a plain terminal:
//!
//! ```text
//! 'X' <type: 8 hex> <id: 8 hex> <size: 4 hex> <offset: 4 hex> <payload: size * 2 hex>
//! ```
//!
//! Hex is upper case on encode and case-insensitive on decode. The decoder
//! skips any non-hex byte while it waits for a nibble, so stray line endings
//! or noise on a hand-wired link are harmless, and a new `'X'` always
//! restarts framing.

use core::fmt;

use heapless::Vec;

use crate::{
    ComponentId, ComponentType, KnowledgeKey,
    fragment::{KnowledgeFragment, MAX_FRAGMENT_DATA},
    knowledge::Schemas,
    logging::{debug, trace, warn},
    transport::{SendError, Transport},
};

/// Start of every frame.
pub const FRAME_MARKER: u8 = b'X';

/// Decoded header bytes: type (4), id (4), size (2), offset (2).
pub const HEADER_LEN: usize = 12;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum EncodeFrameError {
    BufferTooSmall,
}

/// A frame that could not be decoded. The decoder has already dropped it.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    /// The frame ended (new marker, closed link, end of input) before its
    /// payload was complete.
    Truncated,
    /// `offset + size` runs past the record size declared for the type.
    Oversized { ty: ComponentType, offset: u16, size: u16 },
    /// No schema for this type, so its size cannot be checked.
    UnknownType(ComponentType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Header,
    Payload,
}

/// Byte-at-a-time frame decoder.
///
/// Meant to be fed from the receive path, one byte per call. It never blocks
/// and never hands out a partial fragment: a fragment is only returned once
/// every payload byte has arrived.
pub struct FrameDecoder<'s, S: Schemas + ?Sized> {
    schemas: &'s S,
    phase: Phase,
    high: Option<u8>,
    header: [u8; HEADER_LEN],
    header_len: usize,
    key: KnowledgeKey,
    offset: u16,
    size: usize,
    payload: Vec<u8, MAX_FRAGMENT_DATA>,
}

// ---- encoding ----

/// Bytes needed to frame a fragment with `size` payload bytes.
pub const fn encoded_len(size: usize) -> usize {
    1 + 2 * HEADER_LEN + 2 * size
}

fn emit<F: FnMut(u8)>(frag: &KnowledgeFragment, mut put: F) {
    put(FRAME_MARKER);
    let mut hex = |b: u8| {
        put(HEX_DIGITS[usize::from(b >> 4)]);
        put(HEX_DIGITS[usize::from(b & 0x0F)]);
    };
    // Offsets and sizes always fit u16, `KnowledgeFragment::new` checks it.
    let size = frag.size() as u16;
    let offset = frag.offset() as u16;

    frag.ty().0.to_be_bytes().into_iter().for_each(&mut hex);
    frag.id().0.to_be_bytes().into_iter().for_each(&mut hex);
    size.to_be_bytes().into_iter().for_each(&mut hex);
    offset.to_be_bytes().into_iter().for_each(&mut hex);
    frag.data().iter().copied().for_each(&mut hex);
}

/// Frame `frag` into `out`, returning the number of bytes used.
pub fn encode_frame(frag: &KnowledgeFragment, out: &mut [u8]) -> Result<usize, EncodeFrameError> {
    let len = encoded_len(frag.size());
    let out = out
        .get_mut(..len)
        .ok_or(EncodeFrameError::BufferTooSmall)?;
    let mut at = 0;
    emit(frag, |b| {
        out[at] = b;
        at += 1;
    });
    Ok(len)
}

/// Polls of [`Transport::can_send`] per byte before [`write_frame`] gives up.
pub const SEND_SPIN_LIMIT: u32 = 10_000;

/// Frame `frag` straight onto a transport.
///
/// Refuses with [`SendError::Full`] up front when the link reports less
/// room than the whole frame needs. Links that cannot tell are polled, at
/// most [`SEND_SPIN_LIMIT`] times per byte; a frame cut short that way is
/// dropped by the receiver at the next marker.
pub fn write_frame<T: Transport + ?Sized>(
    frag: &KnowledgeFragment,
    link: &mut T,
) -> Result<(), SendError> {
    let needed = encoded_len(frag.size());
    if let Some(room) = link.send_room() {
        if room < needed {
            debug!("tx frame {} needs {} bytes, link has {}", frag.key(), needed, room);
            return Err(SendError::Full);
        }
    }
    trace!("tx frame {} +{}", frag.key(), frag.size());

    let mut res = Ok(());
    emit(frag, |b| {
        if res.is_err() {
            return;
        }
        let mut spins = 0;
        while !link.can_send() {
            spins += 1;
            if spins == SEND_SPIN_LIMIT {
                warn!("tx frame {} stalled, dropping the rest", frag.key());
                res = Err(SendError::Full);
                return;
            }
            core::hint::spin_loop();
        }
        link.send(b);
    });
    res
}

// ---- decoding ----

#[inline]
fn nibble(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

impl<'s, S: Schemas + ?Sized> FrameDecoder<'s, S> {
    pub fn new(schemas: &'s S) -> Self {
        Self {
            schemas,
            phase: Phase::Idle,
            high: None,
            header: [0; HEADER_LEN],
            header_len: 0,
            key: KnowledgeKey::new(ComponentType(0), ComponentId(0)),
            offset: 0,
            size: 0,
            payload: Vec::new(),
        }
    }

    /// True while a frame has been started but not completed.
    pub fn in_frame(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Feed one received byte.
    ///
    /// Returns `Some` when a frame finished, successfully or not.
    pub fn feed(&mut self, byte: u8) -> Option<Result<KnowledgeFragment, DecodeError>> {
        if byte == FRAME_MARKER {
            let interrupted = self.in_frame();
            self.restart();
            if interrupted {
                debug!("frame marker inside a frame, dropping the partial frame");
                return Some(Err(DecodeError::Truncated));
            }
            return None;
        }

        if self.phase == Phase::Idle {
            return None;
        }
        let nib = nibble(byte)?;
        let Some(high) = self.high.take() else {
            self.high = Some(nib);
            return None;
        };
        let byte = (high << 4) | nib;

        match self.phase {
            Phase::Idle => None,
            Phase::Header => self.push_header(byte),
            Phase::Payload => self.push_payload(byte),
        }
    }

    /// The link went away. Drop any partial frame.
    ///
    /// Returns `true` if a partial frame was discarded.
    pub fn abort(&mut self) -> bool {
        let interrupted = self.in_frame();
        if interrupted {
            debug!("link closed mid-frame, dropping the partial frame");
        }
        self.phase = Phase::Idle;
        self.high = None;
        interrupted
    }

    fn restart(&mut self) {
        self.phase = Phase::Header;
        self.high = None;
        self.header_len = 0;
        self.payload.clear();
    }

    fn push_header(&mut self, byte: u8) -> Option<Result<KnowledgeFragment, DecodeError>> {
        self.header[self.header_len] = byte;
        self.header_len += 1;
        if self.header_len < HEADER_LEN {
            return None;
        }

        let h = &self.header;
        let ty = ComponentType(u32::from_be_bytes([h[0], h[1], h[2], h[3]]));
        let id = ComponentId(u32::from_be_bytes([h[4], h[5], h[6], h[7]]));
        let size = u16::from_be_bytes([h[8], h[9]]);
        let offset = u16::from_be_bytes([h[10], h[11]]);

        self.phase = Phase::Idle;
        let Some(schema) = self.schemas.schema(ty) else {
            trace!("dropping frame for unknown type {}", ty);
            return Some(Err(DecodeError::UnknownType(ty)));
        };
        let end = usize::from(offset) + usize::from(size);
        if end > schema.size || usize::from(size) > MAX_FRAGMENT_DATA {
            warn!("dropping frame for {}: {}+{} past record end", ty, offset, size);
            return Some(Err(DecodeError::Oversized { ty, offset, size }));
        }

        self.key = KnowledgeKey::new(ty, id);
        self.offset = offset;
        self.size = usize::from(size);
        if self.size == 0 {
            return Some(self.finish());
        }
        self.phase = Phase::Payload;
        None
    }

    fn push_payload(&mut self, byte: u8) -> Option<Result<KnowledgeFragment, DecodeError>> {
        // Capacity is checked against `size` when the header completes.
        let _ = self.payload.push(byte);
        if self.payload.len() < self.size {
            return None;
        }
        self.phase = Phase::Idle;
        Some(self.finish())
    }

    fn finish(&mut self) -> Result<KnowledgeFragment, DecodeError> {
        let frag = KnowledgeFragment::new(self.key, self.offset, &self.payload)
            .map_err(|_| DecodeError::Oversized {
                ty: self.key.ty,
                offset: self.offset,
                size: self.size as u16,
            });
        self.payload.clear();
        frag
    }
}

/// Decode the first frame found in `bytes`.
pub fn decode_frame<S: Schemas + ?Sized>(
    bytes: &[u8],
    schemas: &S,
) -> Result<KnowledgeFragment, DecodeError> {
    let mut decoder = FrameDecoder::new(schemas);
    for &b in bytes {
        if let Some(res) = decoder.feed(b) {
            return res;
        }
    }
    Err(DecodeError::Truncated)
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated => f.write_str("truncated frame"),
            DecodeError::Oversized { ty, offset, size } => {
                write!(f, "frame for {ty} covers {offset}+{size}, past record end")
            }
            DecodeError::UnknownType(ty) => write!(f, "frame for unknown type {ty}"),
        }
    }
}

impl core::error::Error for DecodeError {}

impl fmt::Display for EncodeFrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeFrameError::BufferTooSmall => f.write_str("output buffer too small"),
        }
    }
}

impl core::error::Error for EncodeFrameError {}

#[cfg(test)]
mod test {
    use core::cell::Cell;

    use rand::{Rng, SeedableRng, rngs::SmallRng};

    use super::{
        DecodeError, FrameDecoder, SEND_SPIN_LIMIT, decode_frame, encode_frame, encoded_len,
        write_frame,
    };
    use crate::{
        ComponentId, ComponentType, KnowledgeKey,
        fragment::{KnowledgeFragment, MAX_FRAGMENT_DATA},
        knowledge::Schema,
        transport::{SendError, Transport},
    };

    static SCHEMAS: &[Schema] = &[Schema {
        ty: ComponentType(0x42),
        size: 64,
        groups: &[32, 32],
    }];

    fn frag(offset: u16, data: &[u8]) -> KnowledgeFragment {
        KnowledgeFragment::new(
            KnowledgeKey::new(ComponentType(0x42), ComponentId(0xDEAD_BEEF)),
            offset,
            data,
        )
        .unwrap()
    }

    #[test]
    fn frame_layout_matches_the_grammar() {
        let f = frag(0x20, &[0x01, 0xAB]);
        let mut out = [0u8; 64];
        let used = encode_frame(&f, &mut out).unwrap();
        assert_eq!(used, encoded_len(2));
        assert_eq!(
            core::str::from_utf8(&out[..used]).unwrap(),
            "X00000042DEADBEEF0002002001AB"
        );
    }

    #[test]
    fn decodes_lower_case_and_skips_noise() {
        let input = b"junk\r\nX00000042 deadbeef\r\n0002 0020 01ab";
        let got = decode_frame(input, SCHEMAS).unwrap();
        assert_eq!(got, frag(0x20, &[0x01, 0xAB]));
    }

    #[test]
    fn encode_then_decode_returns_the_fragment() {
        let data: Vec<u8> = (0..32).collect();
        let f = frag(32, &data);
        let mut out = [0u8; 128];
        let used = encode_frame(&f, &mut out).unwrap();
        assert_eq!(decode_frame(&out[..used], SCHEMAS), Ok(f));
    }

    #[test]
    fn any_valid_fragment_survives_the_wire() {
        // Only sizes matter to the decoder; group layout is the cache's job.
        static RECORDS: &[Schema] = &[
            Schema {
                ty: ComponentType(0),
                size: 1,
                groups: &[1],
            },
            Schema {
                ty: ComponentType(0x42),
                size: 64,
                groups: &[32, 32],
            },
            Schema {
                ty: ComponentType(u32::MAX),
                size: MAX_FRAGMENT_DATA,
                groups: &[MAX_FRAGMENT_DATA],
            },
        ];

        let mut rng = SmallRng::seed_from_u64(0xF7A3);
        let mut out = vec![0u8; encoded_len(MAX_FRAGMENT_DATA)];
        let mut check = |ty: ComponentType, id: u32, offset: usize, data: &[u8]| {
            let f = KnowledgeFragment::new(
                KnowledgeKey::new(ty, ComponentId(id)),
                offset as u16,
                data,
            )
            .unwrap();
            let used = encode_frame(&f, &mut out).unwrap();
            assert_eq!(used, encoded_len(data.len()));
            assert_eq!(decode_frame(&out[..used], RECORDS), Ok(f));
        };

        for schema in RECORDS {
            // Empty, and ending exactly at the record end.
            check(schema.ty, 0, 0, &[]);
            check(schema.ty, u32::MAX, schema.size, &[]);
            let full: Vec<u8> = (0..schema.size).map(|_| rng.r#gen()).collect();
            check(schema.ty, 1, 0, &full);
            check(schema.ty, 2, schema.size - 1, &full[..1]);
        }

        for _ in 0..500 {
            let schema = &RECORDS[rng.gen_range(0..RECORDS.len())];
            let offset = rng.gen_range(0..=schema.size);
            let size = rng.gen_range(0..=schema.size - offset);
            let data: Vec<u8> = (0..size).map(|_| rng.r#gen()).collect();
            check(schema.ty, rng.r#gen(), offset, &data);
        }
    }

    #[test]
    fn truncated_input_is_an_error() {
        assert_eq!(
            decode_frame(b"X00000042DEADBEEF0002002001", SCHEMAS),
            Err(DecodeError::Truncated)
        );
    }

    #[test]
    fn marker_resynchronizes_mid_frame() {
        let mut dec = FrameDecoder::new(SCHEMAS);
        let mut results = std::vec::Vec::new();
        for &b in b"X00000042DEADBEEF00020020X00000042DEADBEEF0001000007".iter() {
            if let Some(r) = dec.feed(b) {
                results.push(r);
            }
        }
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], Err(DecodeError::Truncated));
        assert_eq!(results[1], Ok(frag(0, &[0x07])));
        assert!(!dec.in_frame());
    }

    #[test]
    fn oversized_and_unknown_frames_are_dropped() {
        assert_eq!(
            decode_frame(b"X00000042000000010021002000", SCHEMAS),
            Err(DecodeError::Oversized {
                ty: ComponentType(0x42),
                offset: 0x20,
                size: 0x21
            })
        );
        assert_eq!(
            decode_frame(b"X0000000700000001000100000A", SCHEMAS),
            Err(DecodeError::UnknownType(ComponentType(7)))
        );
    }

    #[test]
    fn abort_discards_partial_frame() {
        let mut dec = FrameDecoder::new(SCHEMAS);
        for &b in b"X00000042DEADBEEF000100" {
            assert!(dec.feed(b).is_none());
        }
        assert!(dec.abort());
        assert!(!dec.abort());
        // The rest of the old frame is noise now.
        assert!(dec.feed(b'0').is_none());
        assert!(dec.feed(b'7').is_none());
    }

    // Never ready, and cannot say how much room it has.
    #[derive(Default)]
    struct Stuck {
        polls: Cell<u32>,
    }

    impl Transport for Stuck {
        fn can_send(&self) -> bool {
            self.polls.set(self.polls.get() + 1);
            false
        }

        fn send(&mut self, _: u8) {
            panic!("nothing may be sent");
        }

        fn can_recv(&self) -> bool {
            false
        }

        fn recv(&mut self) -> u8 {
            0
        }
    }

    #[test]
    fn stalled_link_gives_up() {
        let mut link = Stuck::default();
        assert_eq!(
            write_frame(&frag(0, &[1, 2]), &mut link),
            Err(SendError::Full)
        );
        assert_eq!(link.polls.get(), SEND_SPIN_LIMIT);
    }

    #[test]
    fn small_buffer_is_refused() {
        let f = frag(0, &[1, 2, 3]);
        let mut out = [0u8; 10];
        assert!(encode_frame(&f, &mut out).is_err());
    }
}
