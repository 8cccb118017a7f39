//! A 64-byte record with a single group boundary at byte 32, sent through
//! the wire codec into a cache.

use deeco::{
    ComponentId, ComponentType, KnowledgeCache, KnowledgeFragment, Schema,
    cache::{Applied, ProtocolViolation},
    transport::{FragmentSink, Loopback, Receiver, RxError, SharedLink, Transport},
    wire_frames::{DecodeError, encode_frame, encoded_len},
};
use mutex::raw_impls::cs::CriticalSectionRawMutex as CSRMutex;
use rand::{Rng, SeedableRng, rngs::SmallRng};

deeco::knowledge! {
    #[component_type(ComponentType(0x00C0_FFEE))]
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct Halves {
        group {
            pub front: [u8; 32],
        }
        group {
            pub back: [u8; 32],
        }
    }
}

static SCHEMAS: &[Schema] = &[Schema::of::<Halves>()];

type Cache = KnowledgeCache<CSRMutex, 4, 64>;

const ID: ComponentId = ComponentId(3);

fn send_bytes(rx: &mut Receiver<'_, CSRMutex, 4, 64>, frag: &KnowledgeFragment) -> Option<Result<Applied, RxError>> {
    let mut buf = [0u8; 256];
    let used = encode_frame(frag, &mut buf).unwrap();
    assert_eq!(used, encoded_len(frag.size()));
    let mut last = None;
    for &b in &buf[..used] {
        if let Some(res) = rx.on_byte(b, 0) {
            last = Some(res);
        }
    }
    last
}

fn stored(cache: &Cache) -> Halves {
    cache.lookup::<Halves>(ID).unwrap()
}

#[test]
fn two_halves_rebuild_the_record() {
    let cache = Cache::new(SCHEMAS);
    let mut rx = Receiver::new(&cache);
    let src = Halves {
        front: core::array::from_fn(|i| i as u8),
        back: core::array::from_fn(|i| 0x80 | i as u8),
    };

    let front = KnowledgeFragment::group(&src, ID, 0).unwrap();
    let back = KnowledgeFragment::group(&src, ID, 1).unwrap();
    assert_eq!(send_bytes(&mut rx, &front), Some(Ok(Applied::Created)));
    assert_eq!(send_bytes(&mut rx, &back), Some(Ok(Applied::Updated)));
    assert_eq!(stored(&cache), src);
}

#[test]
fn first_back_half_leaves_front_zeroed() {
    let cache = Cache::new(SCHEMAS);
    let mut rx = Receiver::new(&cache);
    let src = Halves {
        front: [0x11; 32],
        back: [0x22; 32],
    };
    send_bytes(&mut rx, &KnowledgeFragment::group(&src, ID, 1).unwrap());
    assert_eq!(
        stored(&cache),
        Halves {
            front: [0; 32],
            back: [0x22; 32]
        }
    );
}

#[test]
fn straddling_fragment_is_refused() {
    let cache = Cache::new(SCHEMAS);
    let mut rx = Receiver::new(&cache);
    let src = Halves {
        front: [1; 32],
        back: [2; 32],
    };
    send_bytes(&mut rx, &KnowledgeFragment::whole(&src, ID).unwrap());

    let straddle = KnowledgeFragment::encode(&Halves { front: [9; 32], back: [9; 32] }, ID, 16, 32).unwrap();
    assert_eq!(
        send_bytes(&mut rx, &straddle),
        Some(Err(RxError::Protocol(ProtocolViolation::StraddlesGroup(
            straddle.key()
        ))))
    );
    assert_eq!(stored(&cache), src);
    assert_eq!(rx.stats().rejected, 1);
}

#[test]
fn oversized_frame_never_reaches_the_cache() {
    let cache = Cache::new(SCHEMAS);
    let mut rx = Receiver::new(&cache);
    // offset 0x30 + size 0x20 runs past 64 bytes.
    let mut res = None;
    for &b in b"X00C0FFEE000000030020003000" {
        res = rx.on_byte(b, 0).or(res);
    }
    assert_eq!(
        res,
        Some(Err(RxError::Decode(DecodeError::Oversized {
            ty: ComponentType(0x00C0_FFEE),
            offset: 0x30,
            size: 0x20
        })))
    );
    assert!(cache.is_empty());
}

#[test]
fn any_order_of_group_updates_ends_with_the_latest_per_group() {
    let mut rng = SmallRng::seed_from_u64(0x5EED);

    for _ in 0..50 {
        let cache = Cache::new(SCHEMAS);
        let link = SharedLink::<CSRMutex, _>::new(Loopback::<8192>::new());
        let mut rx = Receiver::new(&cache);

        let mut expect = Halves {
            front: [0; 32],
            back: [0; 32],
        };
        for _ in 0..20 {
            let value: u8 = rng.r#gen();
            let group = rng.gen_range(0..2);
            let mut k = expect;
            if group == 0 {
                k.front = [value; 32];
            } else {
                k.back = [value; 32];
            }
            link.send_fragment(&KnowledgeFragment::group(&k, ID, group).unwrap())
                .unwrap();
            expect = k;
        }

        link.with_link(|l| {
            rx.poll(l, 1);
            assert!(!l.can_recv());
        });
        assert_eq!(stored(&cache), expect);
        assert_eq!(rx.stats().applied, 20);
    }
}
