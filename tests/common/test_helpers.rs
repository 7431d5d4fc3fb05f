use chrono::{NaiveDate, NaiveDateTime};
use scoped_cooldown::{
    BucketDimension, Cooldown, CooldownSpec, InMemoryCooldownStore, ManualClock,
};
use std::time::Duration;

pub fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap().and_hms_opt(h, m, s).unwrap()
}

pub fn rolling(action: &str, rate: u32, secs: u64, dimension: BucketDimension) -> CooldownSpec {
    CooldownSpec::builder(action)
        .rate(rate)
        .per(Duration::from_secs(secs))
        .dimension(dimension)
        .build()
        .expect("valid spec")
}

/// In-memory facade on a manual clock, with `specs` registered.
pub fn facade(
    start: NaiveDateTime,
    specs: impl IntoIterator<Item = CooldownSpec>,
) -> (Cooldown<InMemoryCooldownStore>, ManualClock) {
    let clock = ManualClock::new(start);
    let builder = specs
        .into_iter()
        .fold(Cooldown::builder(InMemoryCooldownStore::new()).clock(clock.clone()), |b, s| {
            b.register(s)
        });
    (builder.build().expect("facade builds"), clock)
}
