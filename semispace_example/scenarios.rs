//! Named workloads run by the example binary. Each one checks its own results and fails with a
//! `ScenarioError` if a live value was lost or corrupted by a collection.

use std::fmt;

use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, info};

use semispace_gc::{GcError, GcPtr, GcStats, HandleScope};

use crate::objects::{list_length, num_value, sum_list, Machine, Value, Vector};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Gc(#[from] GcError),

    #[error("{what}: expected {expected}, found {found}")]
    Mismatch {
        what: &'static str,
        expected: i64,
        found: i64,
    },

    #[error("expected the heap to run out of memory")]
    MissingOutOfMemory,
}

pub type ScenarioResult<T> = Result<T, ScenarioError>;

fn check(what: &'static str, expected: i64, found: i64) -> ScenarioResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(ScenarioError::Mismatch {
            what,
            expected,
            found,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    /// Two numbers held only by a pair survive a collection
    Pair,
    /// Build a long list while the heap is under pressure
    List,
    /// Random mutation of a rooted vector of lists
    Churn,
    /// Request more memory than the heap can ever provide
    Oom,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::Pair,
        Scenario::List,
        Scenario::Churn,
        Scenario::Oom,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Pair => "pair",
            Scenario::List => "list",
            Scenario::Churn => "churn",
            Scenario::Oom => "oom",
        }
    }

    pub fn run(&self, machine: &mut Machine, config: &ScenarioConfig) -> ScenarioResult<Report> {
        info!(scenario = self.name(), "running scenario");

        let summary = match self {
            Scenario::Pair => run_pair(machine)?,
            Scenario::List => run_list(machine, config)?,
            Scenario::Churn => run_churn(machine, config)?,
            Scenario::Oom => run_oom(machine)?,
        };

        Ok(Report {
            scenario: *self,
            summary,
            stats: machine.stats().clone(),
        })
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    /// Amount of work done by the scenario, its meaning depends on the scenario
    pub iterations: usize,
    /// Seed for scenarios that make random choices
    pub seed: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            iterations: 1000,
            seed: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Report {
    pub scenario: Scenario,
    pub summary: String,
    pub stats: GcStats,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", self.scenario, self.summary)?;
        write!(
            f,
            "  collections: {}, last copied: {} objects / {} bytes, last reclaimed: {} bytes, \
             total copied: {} bytes",
            self.stats.collections,
            self.stats.last_objects_copied,
            self.stats.last_bytes_copied,
            self.stats.last_bytes_reclaimed,
            self.stats.total_bytes_copied,
        )
    }
}

/// Collections forced by garbage once the pair has survived an explicit one
const PAIR_EXTRA_COLLECTIONS: u64 = 3;

/// A = 3 and B = 4 are only protected while the pair C is built. After that C alone keeps them
/// alive, through a collection and then through enough garbage to force several more.
fn run_pair(machine: &mut Machine) -> ScenarioResult<String> {
    let scope = HandleScope::new();
    let pair = HandleScope::run(|inner| -> ScenarioResult<_> {
        let a = inner.handle(machine.num(3)?);
        let b = inner.handle(machine.num(4)?);
        Ok(scope.handle(machine.cons(Some(a.cast()), Some(b.cast()))?))
    })?;

    let collections_before = machine.stats().collections;
    machine.collect();
    check("objects copied", 3, machine.stats().last_objects_copied as i64)?;
    check("car", 3, num_value(pair.car).unwrap_or(0))?;
    check("cdr", 4, num_value(pair.cdr).unwrap_or(0))?;

    let target = machine.stats().collections + PAIR_EXTRA_COLLECTIONS;
    let mut garbage = 0;
    while machine.stats().collections < target {
        machine.num(garbage)?;
        garbage += 1;
    }

    check("car", 3, num_value(pair.car).unwrap_or(0))?;
    check("cdr", 4, num_value(pair.cdr).unwrap_or(0))?;

    Ok(format!(
        "pair survived {} collections and {} garbage numbers",
        machine.stats().collections - collections_before,
        garbage
    ))
}

/// Build a list of `iterations` numbers held in a global, interleaved with garbage
fn run_list(machine: &mut Machine, config: &ScenarioConfig) -> ScenarioResult<String> {
    let values: Vec<i64> = (0..config.iterations as i64).collect();
    let list = machine.list(&values)?;
    let global = machine.define_global(list.map(|list| list.header()));

    for value in &values {
        machine.vector((*value as usize) % 8)?;
    }
    machine.collect();

    let list = machine.global(global);
    check("list length", values.len() as i64, list_length(list) as i64)?;
    check("list sum", values.iter().sum(), sum_list(list))?;

    Ok(format!("list of {} numbers intact", values.len()))
}

const CHURN_SLOTS: usize = 16;

/// Largest garbage vector allocated after each mutation. Large enough that the default heap fills
/// up several times over a default run.
const CHURN_GARBAGE_SLOTS: usize = 256;

fn churn_entries(machine: &Machine, root: usize) -> Option<GcPtr<Vector>> {
    machine.global(root).map(|vector| vector.cast::<Vector>())
}

/// Randomly replace the entries of a rooted vector with fresh numbers, with lists that extend
/// other entries, or with nothing, while allocating garbage. A shadow copy of each entry's sum is
/// compared with the heap after every collection.
fn run_churn(machine: &mut Machine, config: &ScenarioConfig) -> ScenarioResult<String> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut expected = [0i64; CHURN_SLOTS];

    let vector = machine.vector(CHURN_SLOTS)?;
    let root = machine.define_global(Some(vector.header()));

    let mut checks = 0;
    let mut collections = machine.stats().collections;
    for _ in 0..config.iterations {
        let slot = rng.random_range(0..CHURN_SLOTS);
        let value = rng.random_range(-100..100);

        let new_entry: Value = match rng.random_range(0..10) {
            0..=4 => {
                expected[slot] = value;
                Some(machine.num(value)?.header())
            }
            5..=8 => {
                let tail = rng.random_range(0..CHURN_SLOTS);
                let scope = HandleScope::new();
                let num = scope.handle(machine.num(value)?);
                let tail_entry = churn_entries(machine, root).and_then(|entries| entries.get(tail));
                let tail_entry = tail_entry.map(|entry| scope.handle(entry));

                let cell = machine.cons(Some(num.cast()), tail_entry)?;
                expected[slot] = value + expected[tail];
                Some(cell.header())
            }
            _ => {
                expected[slot] = 0;
                None
            }
        };

        if let Some(mut entries) = churn_entries(machine, root) {
            entries.set(slot, new_entry);
        }

        // Garbage that is dropped immediately
        machine.vector(rng.random_range(0..CHURN_GARBAGE_SLOTS))?;

        if machine.stats().collections != collections {
            collections = machine.stats().collections;
            verify_churn(machine, root, &expected)?;
            checks += 1;
        }
    }

    machine.collect();
    verify_churn(machine, root, &expected)?;
    debug!(checks, "churn verified");

    Ok(format!(
        "{} mutations verified across {} collections, {} of them under allocation pressure",
        config.iterations,
        checks + 1,
        checks
    ))
}

fn verify_churn(machine: &Machine, root: usize, expected: &[i64]) -> ScenarioResult<()> {
    let entries = match churn_entries(machine, root) {
        Some(entries) => entries,
        None => return check("root vector present", 1, 0),
    };

    for (index, expected) in expected.iter().enumerate() {
        check("entry sum", *expected, sum_list(entries.get(index)))?;
    }

    Ok(())
}

/// Ask for a vector bigger than the whole heap
fn run_oom(machine: &mut Machine) -> ScenarioResult<String> {
    let len = machine.heap().capacity() / core::mem::size_of::<Value>() + 1;

    match machine.vector(len) {
        Ok(_) => Err(ScenarioError::MissingOutOfMemory),
        Err(error @ GcError::OutOfMemory { .. }) => Ok(format!("allocation refused: {}", error)),
        Err(error) => Err(error.into()),
    }
}

#[cfg(test)]
mod tests {
    use semispace_gc::HeapOptionsBuilder;

    use super::*;

    #[test]
    fn test_report_display() {
        let report = Report {
            scenario: Scenario::Pair,
            summary: "ok".to_owned(),
            stats: GcStats::default(),
        };

        let text = report.to_string();
        assert!(text.starts_with("pair: ok\n"));
        assert!(text.contains("collections: 0"));
    }

    #[test]
    fn test_mismatch_message() {
        let error = check("car", 3, 5).unwrap_err();
        assert_eq!(error.to_string(), "car: expected 3, found 5");
    }

    #[test]
    fn test_small_churn() {
        let options = HeapOptionsBuilder::new().heap_size(16 * 1024).build();
        let mut machine = Machine::new(options).unwrap();
        let config = ScenarioConfig {
            iterations: 300,
            seed: 7,
        };

        let report = Scenario::Churn.run(&mut machine, &config).unwrap();
        assert!(report.stats.collections > 1);
    }

    #[test]
    fn test_default_churn_collects_mid_run() {
        let options = HeapOptionsBuilder::new().gc_stress_test(false).build();
        let mut machine = Machine::new(options).unwrap();

        let report = Scenario::Churn
            .run(&mut machine, &ScenarioConfig::default())
            .unwrap();

        // The final explicit collection plus at least one forced by the workload
        assert!(report.stats.collections >= 2);
        assert!(!report.summary.contains(", 0 of them under allocation pressure"));
    }

    #[test]
    fn test_pair_summary_counts_real_collections() {
        for stress in [false, true] {
            let options = HeapOptionsBuilder::new()
                .heap_size(4096)
                .gc_stress_test(stress)
                .build();
            let mut machine = Machine::new(options).unwrap();

            let report = Scenario::Pair
                .run(&mut machine, &ScenarioConfig::default())
                .unwrap();

            // Building the pair takes 3 allocations, each collecting first under stress
            let expected_total = if stress { 7 } else { 4 };
            assert_eq!(report.stats.collections, expected_total);
            assert!(report.summary.starts_with("pair survived 4 collections"));
        }
    }
}
