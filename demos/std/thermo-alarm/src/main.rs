//! Two nodes in one process: a sensor node hosting two thermometers and an
//! alarm node watching them. The nodes share nothing but two serial links
//! made of channels, one each way.

mod thermo;

use std::time::Duration;

use deeco::{
    Component, ComponentId, KnowledgeCache, Schema, field,
    ensemble::{CoordinatorExchange, MemberExchange},
    runtime::{self, ChannelTx, Clock},
    task::{PeriodicTask, PublishTask, TriggeredTask},
    transport::{Receiver, SharedLink},
};
use log::{info, warn};
use mutex::raw_impls::cs::CriticalSectionRawMutex;
use rand::{Rng, SeedableRng, rngs::StdRng};
use thermo::{Alarm, Sensor, TempExchange, THRESHOLD, Value};
use tokio::time::sleep;

type Mutex = CriticalSectionRawMutex;
type Link = SharedLink<Mutex, ChannelTx>;

const PUBLISH_MS: u32 = 1000;
const MEASURE_MS: u32 = 1000;
const CHECK_MS: u32 = 3000;
const RUN_FOR: Duration = Duration::from_secs(30);

static SCHEMAS: &[Schema] = &[Schema::of::<Sensor>(), Schema::of::<Alarm>()];

// Sensor node.
static THERMO_1: Component<Mutex, Sensor> = Component::new(ComponentId(0x0000_1001), Sensor::at(50.08, 14.42));
static THERMO_2: Component<Mutex, Sensor> = Component::new(ComponentId(0x0000_1002), Sensor::at(50.09, 14.40));
static SENSOR_CACHE: KnowledgeCache<Mutex, 8, 256> = KnowledgeCache::new(SCHEMAS);

// Alarm node.
static ALARM: Component<Mutex, Alarm> = Component::new(ComponentId(0x0000_2001), Alarm::at(50.085, 14.41));
static ALARM_CACHE: KnowledgeCache<Mutex, 16, 256> = KnowledgeCache::new(SCHEMAS);

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let clock = Clock::new();
    let (to_alarm, from_sensors) = runtime::channel_link(4096);
    let (to_sensors, from_alarm) = runtime::channel_link(4096);
    let sensor_link: &'static Link = Box::leak(Box::new(SharedLink::new(to_alarm)));
    let alarm_link: &'static Link = Box::leak(Box::new(SharedLink::new(to_sensors)));

    for (seed, thermo) in [(1, &THERMO_1), (2, &THERMO_2)] {
        spawn_thermometer(seed, thermo, sensor_link);
    }
    tokio::spawn(async move {
        let mut rx = Receiver::new(&SENSOR_CACHE);
        runtime::drive_receiver(&mut rx, from_alarm, &clock).await;
    });

    spawn_alarm(alarm_link);
    tokio::spawn(async move {
        let mut rx = Receiver::new(&ALARM_CACHE);
        runtime::drive_receiver(&mut rx, from_sensors, &clock).await;
    });

    sleep(RUN_FOR).await;

    for thermo in [&THERMO_1, &THERMO_2] {
        let k = thermo.snapshot();
        info!(
            "thermometer {}: {:.2}°C, reports to {}",
            thermo.id(),
            k.value.temperature,
            k.coord_id
        );
    }
    let alarm = ALARM.snapshot();
    info!(
        "alarm {}: tracking {} sensors, critical: {}",
        ALARM.id(),
        alarm.nearby.len(),
        alarm.critical
    );
}

fn spawn_thermometer(seed: u64, thermo: &'static Component<Mutex, Sensor>, link: &'static Link) {
    tokio::spawn(async move {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut measure = PeriodicTask::new(thermo, MEASURE_MS, field!(Sensor, value), move |k| {
            // Random walk around room temperature, sometimes running hot.
            let last = if k.value.temperature == 0.0 { 22.0 } else { k.value.temperature };
            Value {
                temperature: (last + rng.gen_range(-0.8..1.0)).clamp(15.0, 35.0),
                humidity: rng.gen_range(35.0..55.0),
            }
        });
        runtime::drive_periodic(&mut measure).await;
    });

    tokio::spawn(async move {
        let mut publish = PublishTask::new(thermo, link, PUBLISH_MS);
        runtime::drive_periodic(&mut publish).await;
    });

    tokio::spawn(async move {
        let mut exchange = MemberExchange::new(
            TempExchange::new(seed),
            thermo,
            field!(Sensor, coord_id),
            &SENSOR_CACHE,
        );
        runtime::drive_periodic(&mut exchange).await;
    });
}

fn spawn_alarm(link: &'static Link) {
    tokio::spawn(async move {
        let mut check = PeriodicTask::new(&ALARM, CHECK_MS, field!(Alarm, critical), |k| {
            info!(">>>> Registered sensors and values:");
            for (id, s) in k.nearby.iter() {
                info!(
                    ">>>>>> Id: {} Temp: {:.2}°C Humi: {:.2}% Posi: {:.6} {:.6}",
                    id, s.value.temperature, s.value.humidity, s.position.lat, s.position.lon
                );
            }
            k.nearby.iter().any(|(_, s)| s.value.temperature > THRESHOLD)
        });
        runtime::drive_periodic(&mut check).await;
    });

    tokio::spawn(async move {
        let mut critical = TriggeredTask::observer(&ALARM, field!(Alarm, critical), |k| {
            if k.critical {
                warn!("##### temperature is CRITICAL #####");
            } else {
                info!("temperature back to normal");
            }
        });
        runtime::drive_triggered(&ALARM, &mut critical).await;
    });

    tokio::spawn(async move {
        let mut publish = PublishTask::new(&ALARM, link, PUBLISH_MS);
        runtime::drive_periodic(&mut publish).await;
    });

    tokio::spawn(async move {
        let mut exchange =
            CoordinatorExchange::new(TempExchange::new(0xA1), &ALARM, field!(Alarm, nearby), &ALARM_CACHE);
        runtime::drive_periodic(&mut exchange).await;
    });
}
