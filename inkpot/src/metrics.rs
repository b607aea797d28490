// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of inkpot.
//
// inkpot is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// inkpot is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with inkpot.  If not,
// see <http://www.gnu.org/licenses/>.

//! # inkpot metrics
//!
//! # Introduction
//!
//! inkpot exposes [Prometheus] metrics at `/metrics`. The counters & gauges themselves need to
//! live somewhere, and I'd prefer not to litter the application state with dozens of fields of
//! type `IntCounterVec`. A map from name to instrument works, but brings with it the footgun of two
//! different call sites accidentally using the same metric name, barring an inconvenient
//! centralized list.
//!
//! [Prometheus]: https://prometheus.io/docs/instrumenting/exposition_formats/
//!
//! # metrics
//!
//! This module uses David Tolnay's [inventory] crate to work around the need for a centralized
//! list. Register each metric where it's used:
//!
//! ```ignore
//! inventory::submit!(metrics::Registration::new("users.logins.successful", Sort::IntegralCounter));
//! // ...
//! async fn do_thing() {
//!     // ...
//!     counter_add!(state.instruments, "users.logins.successful", 1, &[]);
//! }
//! ```
//!
//! then create an [Instruments] instance once, at startup, & attach it to the application state.
//! The constructor checks for name clashes & "pre-builds" every instrument in a
//! [prometheus::Registry].
//!
//! Metric names are given in dotted form; since Prometheus doesn't care for dots, they're
//! rewritten with underscores (& the `inkpot_` prefix) on registration.
//!
//! Looking up a metric that was never registered, or using a counter as a gauge, is a logic error
//! & will panic.

use std::collections::{HashMap, HashSet, hash_map::Entry};

use prometheus::{GaugeVec, IntCounterVec, IntGaugeVec, Opts, Registry};
use snafu::{Backtrace, prelude::*};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("The metric name {name} was registered twice"))]
    DuplicateName { name: String, backtrace: Backtrace },
    #[snafu(display("Failed to create or register metric {name}: {source}"))]
    Prometheus {
        name: String,
        source: prometheus::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to encode metrics: {source}"))]
    Encode {
        source: prometheus::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Metrics weren't valid UTF-8: {source}"))]
    Utf8 {
        source: std::string::FromUtf8Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// Instrument type
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Sort {
    /// Corresponds to [IntCounterVec]
    IntegralCounter,
    /// [GaugeVec]
    FloatGauge,
    /// [IntGaugeVec]
    IntegralGauge,
}

/// The type of thing being inventoried
///
/// Register a metric by name & type using
///
/// ```ignore
/// inventory::submit!{metrics::Registration::new("auth.success", Sort::IntegralCounter)}
/// ```
///
/// Metrics taking labels name them at registration; callers then supply label *values*, in the
/// same order.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Registration {
    name: &'static str,
    sort: Sort,
    labels: &'static [&'static str],
}

impl Registration {
    pub const fn new(name: &'static str, sort: Sort) -> Registration {
        Registration {
            name,
            sort,
            labels: &[],
        }
    }
    pub const fn with_labels(
        name: &'static str,
        sort: Sort,
        labels: &'static [&'static str],
    ) -> Registration {
        Registration { name, sort, labels }
    }
    pub fn name(&self) -> String {
        self.name.to_string()
    }
    pub fn sort(&self) -> Sort {
        self.sort
    }
}

inventory::collect!(Registration);

/// Verify that no metric name has been registered twice
pub fn check_metric_registrations() -> Result<()> {
    let mut names: HashSet<&'static str> = HashSet::new();
    for reg in inventory::iter::<Registration> {
        ensure!(
            names.insert(reg.name),
            DuplicateNameSnafu {
                name: reg.name.to_owned()
            }
        );
    }
    Ok(())
}

/// "users.logins.successful" => "inkpot_users_logins_successful"
fn prometheus_name(prefix: &str, name: &str) -> String {
    format!(
        "{}_{}",
        prefix,
        name.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect::<String>()
    )
}

enum Instrument {
    CounterU64(IntCounterVec),
    GaugeF64(GaugeVec),
    GaugeI64(IntGaugeVec),
}

/// Container for Prometheus instruments
pub struct Instruments {
    registry: Registry,
    map: HashMap<String, Instrument>,
}

impl Instruments {
    pub fn new(prefix: &'static str) -> Result<Instruments> {
        let registry = Registry::new();
        let mut map: HashMap<String, Instrument> = HashMap::new();
        // "Pre-creating" all the registered instruments risks building things that may never be
        // used, but means that `add` and `set` *don't* require a `&mut self`, so we can hold an
        // instance of this type in an Arc.
        for reg in inventory::iter::<Registration> {
            let name = reg.name();
            let opts = Opts::new(prometheus_name(prefix, reg.name), reg.name);
            let instrument = match reg.sort() {
                Sort::IntegralCounter => {
                    let c = IntCounterVec::new(opts, reg.labels)
                        .context(PrometheusSnafu { name: name.clone() })?;
                    registry
                        .register(Box::new(c.clone()))
                        .context(PrometheusSnafu { name: name.clone() })?;
                    Instrument::CounterU64(c)
                }
                Sort::FloatGauge => {
                    let g = GaugeVec::new(opts, reg.labels)
                        .context(PrometheusSnafu { name: name.clone() })?;
                    registry
                        .register(Box::new(g.clone()))
                        .context(PrometheusSnafu { name: name.clone() })?;
                    Instrument::GaugeF64(g)
                }
                Sort::IntegralGauge => {
                    let g = IntGaugeVec::new(opts, reg.labels)
                        .context(PrometheusSnafu { name: name.clone() })?;
                    registry
                        .register(Box::new(g.clone()))
                        .context(PrometheusSnafu { name: name.clone() })?;
                    Instrument::GaugeI64(g)
                }
            };
            match map.entry(name) {
                Entry::Occupied(occupied) => {
                    return DuplicateNameSnafu {
                        name: occupied.key().clone(),
                    }
                    .fail();
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(instrument);
                }
            }
        }

        Ok(Instruments { registry, map })
    }
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
    // panics if `name` doesn't name a counter
    pub fn add(&self, name: &str, count: u64, labels: &[&str]) {
        if let Some(Instrument::CounterU64(c)) = self.map.get(name) {
            c.with_label_values(labels).inc_by(count);
        } else {
            panic!("{} does not name a counter", name);
        }
    }
    pub fn setf(&self, name: &str, value: f64, labels: &[&str]) {
        if let Some(Instrument::GaugeF64(g)) = self.map.get(name) {
            g.with_label_values(labels).set(value);
        } else {
            panic!("{} does not name a gauge", name);
        }
    }
    pub fn seti(&self, name: &str, value: i64, labels: &[&str]) {
        if let Some(Instrument::GaugeI64(g)) = self.map.get(name) {
            g.with_label_values(labels).set(value);
        } else {
            panic!("{} does not name a gauge", name);
        }
    }
    /// Render every registered metric in the Prometheus text exposition format
    pub fn export(&self) -> Result<String> {
        use prometheus::Encoder;
        let mut output = Vec::new();
        prometheus::TextEncoder::new()
            .encode(&self.registry.gather(), &mut output)
            .context(EncodeSnafu)?;
        String::from_utf8(output).context(Utf8Snafu)
    }
}

#[macro_export]
macro_rules! counter_add {
    ($instr:expr, $name:expr, $count:expr, $labels:expr) => {
        $instr.add($name, $count, $labels);
    };
}

#[macro_export]
macro_rules! gauge_seti {
    ($instr:expr, $name:expr, $value:expr, $labels:expr) => {
        $instr.seti($name, $value, $labels);
    };
}

#[cfg(test)]
mod test {
    use super::*;

    inventory::submit! { Registration::new("test.metrics.counter", Sort::IntegralCounter) }
    inventory::submit! {
        Registration::with_labels("test.metrics.labeled", Sort::IntegralCounter, &["color"])
    }
    inventory::submit! { Registration::new("test.metrics.gauge", Sort::IntegralGauge) }

    #[test]
    fn names() {
        assert_eq!(
            prometheus_name("inkpot", "users.logins.successful"),
            "inkpot_users_logins_successful"
        );
    }

    #[test]
    fn export() {
        check_metric_registrations().unwrap();
        let instruments = Instruments::new("inkpot").unwrap();
        counter_add!(instruments, "test.metrics.counter", 3, &[]);
        counter_add!(instruments, "test.metrics.labeled", 1, &["red"]);
        gauge_seti!(instruments, "test.metrics.gauge", 11, &[]);
        let text = instruments.export().unwrap();
        assert!(text.contains("inkpot_test_metrics_counter 3"));
        assert!(text.contains("inkpot_test_metrics_labeled{color=\"red\"} 1"));
        assert!(text.contains("inkpot_test_metrics_gauge 11"));
    }
}
