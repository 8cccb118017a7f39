//! Knowledge and ensemble shared by both nodes.

use deeco::{ComponentId, ComponentType, Ensemble, SlotTable};
use rand::{SeedableRng, rngs::SmallRng};

pub const SENSOR_TYPE: ComponentType = ComponentType(0x0000_0001);
pub const ALARM_TYPE: ComponentType = ComponentType(0x0000_0002);

/// Above this, the alarm goes off.
pub const THRESHOLD: f32 = 26.0;

pub const NEARBY_SLOTS: usize = 10;

deeco::layout! {
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Value {
        pub temperature: f32,
        pub humidity: f32,
    }
}

deeco::layout! {
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Position {
        pub lat: f32,
        pub lon: f32,
    }
}

deeco::layout! {
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct SensorInfo {
        pub value: Value,
        pub position: Position,
    }
}

deeco::knowledge! {
    #[component_type(SENSOR_TYPE)]
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct Sensor {
        group {
            pub value: Value,
        }
        group {
            pub position: Position,
        }
        group {
            pub coord_id: ComponentId,
        }
    }
}

deeco::knowledge! {
    #[component_type(ALARM_TYPE)]
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct Alarm {
        group {
            pub position: Position,
        }
        group {
            pub nearby: SlotTable<SensorInfo, NEARBY_SLOTS>,
        }
        group {
            pub critical: bool,
        }
    }
}

impl Sensor {
    pub const fn at(lat: f32, lon: f32) -> Self {
        Self {
            value: Value {
                temperature: 0.0,
                humidity: 0.0,
            },
            position: Position { lat, lon },
            coord_id: ComponentId::NONE,
        }
    }
}

impl Alarm {
    pub const fn at(lat: f32, lon: f32) -> Self {
        Self {
            position: Position { lat, lon },
            nearby: SlotTable::new(SensorInfo {
                value: Value {
                    temperature: 0.0,
                    humidity: 0.0,
                },
                position: Position { lat: 0.0, lon: 0.0 },
            }),
            critical: false,
        }
    }
}

/// Sensors report their readings to alarms; alarms tell sensors who they
/// report to.
pub struct TempExchange {
    rng: SmallRng,
}

impl TempExchange {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl Ensemble for TempExchange {
    type Coord = Alarm;
    type Member = Sensor;
    type CoordField = SlotTable<SensorInfo, NEARBY_SLOTS>;
    type MemberField = ComponentId;

    const PERIOD_MS: u32 = 2027;

    fn is_member(&mut self, _: ComponentId, _: &Alarm, _: ComponentId, _: &Sensor) -> bool {
        // Every sensor reports to every alarm.
        true
    }

    fn member_to_coord(
        &mut self,
        coord: &Alarm,
        member_id: ComponentId,
        member: &Sensor,
    ) -> Self::CoordField {
        let mut nearby = coord.nearby;
        let info = SensorInfo {
            value: member.value,
            position: member.position,
        };
        nearby.admit(member_id, info, &mut self.rng);
        nearby
    }

    fn coord_to_member(&mut self, _: &Sensor, coord_id: ComponentId, _: &Alarm) -> ComponentId {
        coord_id
    }
}
