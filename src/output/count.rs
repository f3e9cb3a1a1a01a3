//! `--count`: per-attribute accumulation instead of per-entry records.

use crate::types::{tally_label, CountPolicy, Value};
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use std::io::{self, Write};

enum Accumulator {
    Sum(u128),
    Tally(BTreeMap<String, u64>),
}

/// Accumulates counts for each listed attribute plus the `_total` match
/// count.
pub struct CountSink {
    names: Vec<String>,
    accumulators: Vec<Accumulator>,
    total: u64,
}

impl CountSink {
    /// `fields` pairs each attribute's display name with its type's
    /// count policy; non-countable types are rejected before this point.
    pub fn new(fields: Vec<(String, CountPolicy)>) -> CountSink {
        let mut names = Vec::with_capacity(fields.len());
        let mut accumulators = Vec::with_capacity(fields.len());
        for (name, policy) in fields {
            names.push(name);
            accumulators.push(match policy {
                CountPolicy::Sum => Accumulator::Sum(0),
                CountPolicy::Tally => Accumulator::Tally(BTreeMap::new()),
            });
        }
        CountSink {
            names,
            accumulators,
            total: 0,
        }
    }

    /// Adds one matched entry. Null values count toward `_total` but not
    /// toward their attribute.
    pub fn add(&mut self, values: &[Value]) {
        self.total += 1;
        for (accumulator, value) in self.accumulators.iter_mut().zip(values) {
            if value.is_null() {
                continue;
            }
            match accumulator {
                Accumulator::Sum(sum) => {
                    let amount = match value {
                        Value::Size(n) => *n as u128,
                        Value::Duration(n) => (*n).max(0) as u128,
                        _ => 0,
                    };
                    *sum += amount;
                }
                Accumulator::Tally(buckets) => {
                    *buckets.entry(tally_label(value)).or_insert(0) += 1;
                }
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Text form: `attr=SUM` or `attr[bucket]=N` lines, then `_total`.
    pub fn write_text(&self, out: &mut impl Write) -> io::Result<()> {
        for (name, accumulator) in self.names.iter().zip(&self.accumulators) {
            match accumulator {
                Accumulator::Sum(sum) => writeln!(out, "{name}={sum}")?,
                Accumulator::Tally(buckets) => {
                    for (bucket, count) in buckets {
                        writeln!(out, "{name}[{bucket}]={count}")?;
                    }
                }
            }
        }
        writeln!(out, "_total={}", self.total)
    }

    /// JSON form: `{"_total": N, "attr": sum-or-tally-object, ...}`.
    pub fn to_json(&self) -> Json {
        let mut object = Map::new();
        object.insert("_total".to_string(), Json::from(self.total));
        for (name, accumulator) in self.names.iter().zip(&self.accumulators) {
            let value = match accumulator {
                Accumulator::Sum(sum) => Json::from(*sum as u64),
                Accumulator::Tally(buckets) => Json::Object(
                    buckets
                        .iter()
                        .map(|(bucket, count)| (bucket.clone(), Json::from(*count)))
                        .collect(),
                ),
            };
            object.insert(name.clone(), value);
        }
        Json::Object(object)
    }
}
