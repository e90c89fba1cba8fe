use semispace_example::{
    objects::{list_length, num_value, sum_list},
    Machine, Scenario, ScenarioConfig,
};
use semispace_gc::{live_frame_count, HandleScope, HeapOptions, HeapOptionsBuilder};

fn options(heap_size: usize, stress: bool) -> HeapOptions {
    HeapOptionsBuilder::new()
        .heap_size(heap_size)
        .gc_stress_test(stress)
        .poison_from_space(stress)
        .build()
}

fn run(scenario: Scenario, options: HeapOptions, config: &ScenarioConfig) {
    let mut machine = Machine::new(options).unwrap();
    if let Err(err) = scenario.run(&mut machine, config) {
        panic!("{} failed: {}", scenario, err);
    }
    assert_eq!(live_frame_count(), 0);
}

#[test]
fn pair_scenario() {
    let mut machine = Machine::new(options(4096, false)).unwrap();
    let report = Scenario::Pair
        .run(&mut machine, &ScenarioConfig::default())
        .unwrap();

    assert_eq!(report.scenario, Scenario::Pair);
    assert_eq!(report.stats.collections, 4);
    assert_eq!(report.stats.last_objects_copied, 3);
}

#[test]
fn pair_scenario_under_stress() {
    run(Scenario::Pair, options(4096, true), &ScenarioConfig::default());
}

#[test]
fn list_scenario_small_heap() {
    let config = ScenarioConfig {
        iterations: 500,
        seed: 0,
    };
    run(Scenario::List, options(64 * 1024, false), &config);
}

#[test]
fn list_scenario_under_stress() {
    let config = ScenarioConfig {
        iterations: 100,
        seed: 0,
    };
    run(Scenario::List, options(16 * 1024, true), &config);
}

#[test]
fn churn_scenario_seeds() {
    for seed in 0..8 {
        let config = ScenarioConfig {
            iterations: 2000,
            seed,
        };
        run(Scenario::Churn, options(32 * 1024, false), &config);
    }
}

#[test]
fn churn_scenario_under_stress() {
    let config = ScenarioConfig {
        iterations: 200,
        seed: 42,
    };
    run(Scenario::Churn, options(32 * 1024, true), &config);
}

#[cfg(feature = "alloc_error")]
#[test]
fn oom_scenario() {
    let mut machine = Machine::new(options(4096, false)).unwrap();
    let report = Scenario::Oom
        .run(&mut machine, &ScenarioConfig::default())
        .unwrap();

    assert!(report.summary.contains("out of memory"));
    assert_eq!(report.stats.collections, 1);
}

#[test]
fn list_survives_repeated_collections() {
    let mut machine = Machine::new(options(8192, false)).unwrap();
    let values: Vec<i64> = (1..=50).collect();

    let scope = HandleScope::new();
    let list = scope.handle(machine.list(&values).unwrap().unwrap());

    for _ in 0..5 {
        machine.collect();
        assert_eq!(list_length(Some(list.header())), 50);
        assert_eq!(sum_list(Some(list.header())), 1275);
    }
    assert_eq!(machine.stats().last_objects_copied, 100);
}

#[test]
fn vector_slots_rewritten() {
    let mut machine = Machine::new(options(8192, false)).unwrap();

    let scope = HandleScope::new();
    let vector = scope.handle(machine.vector(4).unwrap());
    for (index, value) in [10, 20, 30].into_iter().enumerate() {
        let num = machine.num(value).unwrap();
        let mut entries = vector.get();
        entries.set(index, Some(num.header()));
        // Garbage between the live numbers
        machine.num(-1).unwrap();
    }

    machine.collect();

    let entries = vector.get();
    assert!(machine.heap().contains(entries));
    assert_eq!(machine.stats().last_objects_copied, 4);
    assert_eq!(num_value(entries.get(0)), Some(10));
    assert_eq!(num_value(entries.get(1)), Some(20));
    assert_eq!(num_value(entries.get(2)), Some(30));
    assert_eq!(entries.get(3), None);
    for index in 0..3 {
        assert!(machine.heap().contains(entries.get(index).unwrap()));
    }
}
