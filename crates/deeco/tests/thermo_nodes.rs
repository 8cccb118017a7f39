//! Two nodes, one sensor and one alarm, linked by in-memory serial lines and
//! driven by the cooperative scheduler.

use std::cell::Cell;

use deeco::{
    Component, ComponentId, ComponentType, Ensemble, KnowledgeCache, Scheduler, Schema, SlotTable,
    ensemble::{CoordinatorExchange, MemberExchange},
    field,
    task::{PeriodicTask, PublishTask, TriggeredTask},
    transport::{Loopback, Receiver, SharedLink},
};
use mutex::raw_impls::cs::CriticalSectionRawMutex as CSRMutex;
use rand::{SeedableRng, rngs::SmallRng};

deeco::layout! {
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Reading {
        pub temperature: f32,
        pub humidity: f32,
    }
}

deeco::knowledge! {
    #[component_type(ComponentType(0x0000_0001))]
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct Sensor {
        group {
            pub reading: Reading,
        }
        group {
            pub lat: f32,
            pub lon: f32,
        }
        group {
            pub coord_id: ComponentId,
        }
    }
}

deeco::knowledge! {
    #[component_type(ComponentType(0x0000_0002))]
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct Alarm {
        group {
            pub nearby: SlotTable<Reading, 4>,
        }
        group {
            pub critical: bool,
        }
    }
}

static SCHEMAS: &[Schema] = &[Schema::of::<Sensor>(), Schema::of::<Alarm>()];

const THRESHOLD: f32 = 26.0;

struct TempExchange {
    rng: SmallRng,
}

impl TempExchange {
    fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl Ensemble for TempExchange {
    type Coord = Alarm;
    type Member = Sensor;
    type CoordField = SlotTable<Reading, 4>;
    type MemberField = ComponentId;
    const PERIOD_MS: u32 = 500;

    fn is_member(&mut self, _: ComponentId, _: &Alarm, _: ComponentId, _: &Sensor) -> bool {
        true
    }

    fn member_to_coord(&mut self, coord: &Alarm, id: ComponentId, member: &Sensor) -> Self::CoordField {
        let mut nearby = coord.nearby;
        nearby.admit(id, member.reading, &mut self.rng);
        nearby
    }

    fn coord_to_member(&mut self, _: &Sensor, coord_id: ComponentId, _: &Alarm) -> ComponentId {
        coord_id
    }
}

fn new_sensor(id: u32) -> Component<CSRMutex, Sensor> {
    Component::new(
        ComponentId(id),
        Sensor {
            reading: Reading::default(),
            lat: 50.08,
            lon: 14.42,
            coord_id: ComponentId::NONE,
        },
    )
}

fn new_alarm(id: u32) -> Component<CSRMutex, Alarm> {
    Component::new(
        ComponentId(id),
        Alarm {
            nearby: SlotTable::new(Reading::default()),
            critical: false,
        },
    )
}

#[test]
fn alarm_learns_about_the_sensor_and_raises() {
    let _ = env_logger::builder().is_test(true).try_init();

    let ambient = Cell::new(21.0f32);
    let raised = Cell::new(0u32);

    let sensor = new_sensor(0x10);
    let alarm = new_alarm(0x20);

    let link_a = SharedLink::<CSRMutex, _>::new(Loopback::<2048>::new());
    let link_b = SharedLink::<CSRMutex, _>::new(Loopback::<2048>::new());
    let cache_a = KnowledgeCache::<CSRMutex, 8, 64>::new(SCHEMAS);
    let cache_b = KnowledgeCache::<CSRMutex, 8, 64>::new(SCHEMAS);
    let mut rx_a = Receiver::new(&cache_a);
    let mut rx_b = Receiver::new(&cache_b);

    // Sensor node.
    let mut measure = PeriodicTask::new(&sensor, 1000, field!(Sensor, reading), |_| Reading {
        temperature: ambient.get(),
        humidity: 40.0,
    });
    let mut publish_sensor = PublishTask::new(&sensor, &link_a, 300);
    let mut member = MemberExchange::new(TempExchange::new(1), &sensor, field!(Sensor, coord_id), &cache_a);

    // Alarm node.
    let mut check = PeriodicTask::new(&alarm, 700, field!(Alarm, critical), |k| {
        k.nearby.iter().any(|(_, r)| r.temperature > THRESHOLD)
    });
    let mut critical = TriggeredTask::observer(&alarm, field!(Alarm, critical), |k| {
        if k.critical {
            raised.set(raised.get() + 1);
        }
    });
    let mut publish_alarm = PublishTask::new(&alarm, &link_b, 300);
    let mut coord = CoordinatorExchange::new(TempExchange::new(2), &alarm, field!(Alarm, nearby), &cache_b);

    let mut node_a = Scheduler::<4>::new();
    node_a.add(&mut measure, 0).unwrap();
    node_a.add(&mut publish_sensor, 0).unwrap();
    node_a.add(&mut member, 0).unwrap();

    let mut node_b = Scheduler::<4>::new();
    node_b.add(&mut check, 0).unwrap();
    node_b.add(&mut critical, 0).unwrap();
    node_b.add(&mut publish_alarm, 0).unwrap();
    node_b.add(&mut coord, 0).unwrap();

    let mut run = |from: u64, to: u64| {
        for now in (from..to).step_by(50) {
            node_a.tick(now).unwrap();
            node_b.tick(now).unwrap();
            link_a.with_link(|l| rx_b.poll(l, now));
            link_b.with_link(|l| rx_a.poll(l, now));
        }
    };

    run(0, 5_000);
    assert_eq!(sensor.snapshot().coord_id, alarm.id());
    assert_eq!(
        alarm.snapshot().nearby.get(sensor.id()).map(|r| r.temperature),
        Some(21.0)
    );
    assert!(!alarm.snapshot().critical);
    assert_eq!(raised.get(), 0);

    ambient.set(30.5);
    run(5_000, 10_000);
    assert!(alarm.snapshot().critical);
    assert_eq!(raised.get(), 1);

    ambient.set(22.0);
    run(10_000, 15_000);
    assert!(!alarm.snapshot().critical);
    assert_eq!(raised.get(), 1);

    assert_eq!(rx_a.stats().malformed + rx_b.stats().malformed, 0);
    assert_eq!(rx_a.stats().rejected + rx_b.stats().rejected, 0);
}

#[test]
fn coordinator_table_keeps_at_most_its_capacity() {
    let alarm = new_alarm(0x20);
    let cache = KnowledgeCache::<CSRMutex, 16, 64>::new(SCHEMAS);

    // One more sensor than the table has slots.
    for id in 1..=5u32 {
        let mut s = new_sensor(id).snapshot();
        s.reading.temperature = id as f32;
        let frag = deeco::KnowledgeFragment::whole(&s, ComponentId(id)).unwrap();
        cache.apply(&frag, 0).unwrap();
    }

    let mut coord = CoordinatorExchange::new(TempExchange::new(9), &alarm, field!(Alarm, nearby), &cache);
    assert_eq!(coord.exchange(), 5);

    let table = alarm.snapshot().nearby;
    assert_eq!(table.len(), 4);
    for (id, reading) in table.iter() {
        assert!((1..=5).contains(&id.0));
        assert_eq!(reading.temperature, id.0 as f32);
    }

    // A second pass only refreshes: every cached sensor is either in the
    // table already or replaces one that is, never growing it.
    coord.exchange();
    assert_eq!(alarm.snapshot().nearby.len(), 4);
}
