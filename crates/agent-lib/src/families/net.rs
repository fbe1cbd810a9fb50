//! Network interface throughput

use super::{write_detail, write_reduced, Family};
use crate::engine::clock::{Cadence, Tick};
use crate::engine::rate::{delta, per_second, Baseline};
use crate::engine::reduce::{Reducer, Unit};
use crate::engine::registry::{bounded_key, Keyed, Registry, DEVICE_KEY_MAX};
use crate::engine::ring::{Series, Timeline};
use crate::engine::writer::JsonWriter;
use crate::error::Overflow;
use crate::models::NetStats;

pub const PERIOD: i64 = 5;
pub const SPAN: usize = 60;

const LOOPBACK: &str = "lo";

#[derive(Debug, Clone)]
pub struct NetInterface {
    name: String,
    baseline: Baseline<NetStats>,
    timeline: Timeline,
    rxrate: Series,
    txrate: Series,
}

impl Keyed for NetInterface {
    fn key(&self) -> &str {
        &self.name
    }
}

impl NetInterface {
    fn new(stats: NetStats) -> Self {
        Self {
            name: bounded_key(&stats.name, DEVICE_KEY_MAX).to_string(),
            baseline: Baseline::seeded(stats),
            timeline: Timeline::new(PERIOD, SPAN),
            rxrate: Series::new(SPAN),
            txrate: Series::new(SPAN),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn record(&mut self, now: i64, current: Option<NetStats>) {
        let index = self.timeline.stamp(now);
        let previous = current
            .clone()
            .and_then(|current| self.baseline.advance(current));

        let (rx, tx) = match (previous, current) {
            (Some(previous), Some(current)) => (
                kilobytes_per_second(delta(current.rx_bytes, previous.rx_bytes)),
                kilobytes_per_second(delta(current.tx_bytes, previous.tx_bytes)),
            ),
            _ => (0, 0),
        };
        self.rxrate.set(index, rx);
        self.txrate.set(index, tx);
    }

    fn series(&self) -> [(&'static str, &Series); 2] {
        [("rxrate", &self.rxrate), ("txrate", &self.txrate)]
    }
}

fn kilobytes_per_second(bytes: i64) -> i64 {
    per_second(bytes / 1024, PERIOD)
}

#[derive(Debug, Clone)]
pub struct NetFamily {
    cadence: Cadence,
    interfaces: Registry<NetInterface>,
}

impl Default for NetFamily {
    fn default() -> Self {
        Self::new()
    }
}

impl NetFamily {
    pub fn new() -> Self {
        Self {
            cadence: Cadence::new(PERIOD),
            interfaces: Registry::new(DEVICE_KEY_MAX),
        }
    }

    pub fn poll(&mut self, now: i64) -> Option<Tick> {
        self.cadence.poll(now)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &NetInterface> {
        self.interfaces.iter()
    }

    /// Records one cycle and returns the names of newly discovered
    /// interfaces. Discovery follows the same rules as for disks.
    pub fn record(&mut self, now: i64, tick: Tick, stats: Option<Vec<NetStats>>) -> Vec<String> {
        if tick == Tick::Bootstrap || self.interfaces.is_empty() {
            return self.discover(stats.unwrap_or_default());
        }

        match stats {
            Some(stats) => {
                for current in stats {
                    if let Some(index) = self.interfaces.find(&current.name) {
                        if let Some(interface) = self.interfaces.get_mut(index) {
                            interface.record(now, Some(current));
                        }
                    }
                }
            }
            None => {
                for interface in self.interfaces.iter_mut() {
                    interface.record(now, None);
                }
            }
        }
        Vec::new()
    }

    fn discover(&mut self, stats: Vec<NetStats>) -> Vec<String> {
        let mut added = Vec::new();
        for current in stats {
            if current.name == LOOPBACK || self.interfaces.find(&current.name).is_some() {
                continue;
            }
            let interface = NetInterface::new(current);
            added.push(interface.name.clone());
            self.interfaces.add(interface);
        }
        added
    }
}

impl Family for NetFamily {
    fn name(&self) -> &'static str {
        "net"
    }

    fn entities(&self) -> usize {
        self.interfaces.len()
    }

    fn status(
        &self,
        w: &mut JsonWriter,
        reducer: &mut Reducer,
        now: i64,
    ) -> Result<(), Overflow> {
        w.object(self.name(), |w| {
            for interface in self.interfaces.iter() {
                w.object(&interface.name, |w| {
                    for (name, series) in interface.series() {
                        write_reduced(
                            w,
                            reducer,
                            name,
                            &interface.timeline,
                            series,
                            Unit::KB_PER_SEC,
                            now,
                        )?;
                    }
                    Ok(())
                })?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn details(&self, w: &mut JsonWriter, now: i64, since: i64) -> Result<(), Overflow> {
        w.object(self.name(), |w| {
            for interface in self.interfaces.iter() {
                w.object(&interface.name, |w| {
                    for (name, series) in interface.series() {
                        write_detail(
                            w,
                            name,
                            &interface.timeline,
                            series,
                            Unit::KB_PER_SEC,
                            now,
                            since,
                        )?;
                    }
                    Ok(())
                })?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::testing::{details_json, status_json};
    use serde_json::json;

    const START: i64 = 1_700_000_000;

    fn stats(name: &str, rx_bytes: u64, tx_bytes: u64) -> NetStats {
        NetStats {
            name: name.to_string(),
            rx_bytes,
            tx_bytes,
        }
    }

    #[test]
    fn test_loopback_is_skipped() {
        let mut net = NetFamily::new();
        let added = net.record(
            START,
            Tick::Bootstrap,
            Some(vec![stats("lo", 0, 0), stats("eth0", 0, 0)]),
        );
        assert_eq!(added, vec!["eth0".to_string()]);
        assert_eq!(net.interfaces().map(|i| i.name()).collect::<Vec<_>>(), ["eth0"]);
    }

    #[test]
    fn test_rates_in_kilobytes_per_second() {
        let mut net = NetFamily::new();
        net.record(START, Tick::Bootstrap, Some(vec![stats("eth0", 0, 0)]));
        net.record(
            START + 5,
            Tick::Sample,
            Some(vec![stats("eth0", 51_200, 10_240)]),
        );

        let status = status_json(&net, START + 5);
        assert_eq!(status["net"]["eth0"]["rxrate"], json!([10, "KB/s"]));
        assert_eq!(status["net"]["eth0"]["txrate"], json!([2, "KB/s"]));
    }

    #[test]
    fn test_counter_wrap_is_zero_rate() {
        let mut net = NetFamily::new();
        net.record(START, Tick::Bootstrap, Some(vec![stats("eth0", 1 << 40, 0)]));
        net.record(START + 5, Tick::Sample, Some(vec![stats("eth0", 1024, 0)]));
        assert_eq!(status_json(&net, START + 5), json!({}));
    }

    #[test]
    fn test_long_interface_names_are_bounded() {
        let mut net = NetFamily::new();
        let long = "veth0123456789abcdef";
        net.record(START, Tick::Bootstrap, Some(vec![stats(long, 0, 0)]));
        net.record(START + 5, Tick::Sample, Some(vec![stats(long, 5 * 1024, 0)]));

        let details = details_json(&net, START + 5, 0);
        let key = &long[..DEVICE_KEY_MAX];
        assert_eq!(
            details["net"][key]["rxrate"],
            json!([START + 5, 1, "KB/s"])
        );
    }
}
