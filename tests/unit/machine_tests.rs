//! Reference machine semantics, determinism, and proof validity tests.

use machine_session::config::MachineConfig;
use machine_session::machine::word_machine::{add, halt, jump, load, out, store, WordMachine};
use machine_session::machine::MachineDriver;
use machine_session::models::access_log::AccessOperation;

/// Sum two memory words, store and emit the result, then halt.
fn sum_program() -> MachineConfig {
    let mut program = vec![
        load(1, 10),
        load(2, 11),
        add(3, 1, 2),
        store(12, 3),
        out(3),
        halt(),
    ];
    program.resize(10, 0);
    program.push(5); // word 10
    program.push(7); // word 11
    MachineConfig {
        memory_log2_size: 9,
        program,
        entry_point: 0,
        registers: Vec::new(),
    }
}

#[test]
fn run_executes_program_to_natural_halt() {
    let mut machine = WordMachine::new(&sum_program()).expect("machine");
    machine.run(100).expect("run");

    assert!(machine.halted());
    assert_eq!(machine.read_cycle(), 6);
    assert_eq!(machine.read_output(), 12);
    assert_eq!(machine.read_register(3), 12);
}

#[test]
fn run_stops_at_cycle_limit() {
    let mut machine = WordMachine::new(&sum_program()).expect("machine");
    machine.run(2).expect("run");
    assert_eq!(machine.read_cycle(), 2);
    assert!(!machine.halted());
}

#[test]
fn step_logs_fetch_and_execute_brackets() {
    let mut machine = WordMachine::new(&sum_program()).expect("machine");
    let log = machine.step().expect("step");

    let labels: Vec<&str> = log.brackets.iter().map(|b| b.text.as_str()).collect();
    assert_eq!(labels, vec!["fetch", "fetch", "execute", "execute"]);
    // The fetch read plus the load's memory read.
    assert_eq!(log.accesses.len(), 2);
    assert_eq!(log.accesses[0].operation, AccessOperation::Read);
}

#[test]
fn every_access_proof_verifies() {
    let mut machine = WordMachine::new(&sum_program()).expect("machine");
    for _ in 0..6 {
        let log = machine.step().expect("step");
        for (i, access) in log.accesses.iter().enumerate() {
            assert!(access.proof.verify(), "access {i}");
        }
    }
}

#[test]
fn write_access_records_old_and_new_values() {
    let mut machine = WordMachine::new(&sum_program()).expect("machine");
    machine.run(3).expect("run to the store");
    let log = machine.step().expect("store step");

    let write = log
        .accesses
        .iter()
        .find(|a| a.operation == AccessOperation::Write)
        .expect("store records a write");
    assert_eq!(write.read, 0);
    assert_eq!(write.written, 12);
    assert!(write.proof.verify());
}

#[test]
fn identical_state_yields_byte_identical_step_logs() {
    let mut first = WordMachine::new(&sum_program()).expect("machine");
    let mut second = WordMachine::new(&sum_program()).expect("machine");

    for _ in 0..6 {
        let log_a = first.step().expect("step");
        let log_b = second.step().expect("step");
        assert_eq!(log_a, log_b);
        assert_eq!(
            serde_json::to_string(&log_a).expect("serialize"),
            serde_json::to_string(&log_b).expect("serialize"),
        );
    }
}

#[test]
fn discarded_activity_does_not_change_replay() {
    // A clone taken mid-run is the in-memory analogue of a parked
    // snapshot: running the original further must not affect what the
    // clone later observes.
    let mut original = WordMachine::new(&sum_program()).expect("machine");
    original.run(2).expect("run");
    let snapshot = original.clone();

    original.run(6).expect("diverging activity");

    let mut replay = snapshot.clone();
    let mut fresh = WordMachine::new(&sum_program()).expect("machine");
    fresh.run(2).expect("run");

    assert_eq!(replay.read_cycle(), fresh.read_cycle());
    for _ in 0..4 {
        let log_a = replay.step().expect("step");
        let log_b = fresh.step().expect("step");
        assert_eq!(log_a, log_b);
    }
    assert_eq!(replay.read_output(), fresh.read_output());
    assert_eq!(replay.root_hash(), fresh.root_hash());
}

#[test]
fn stepping_a_halted_machine_is_a_noted_noop() {
    let mut machine = WordMachine::new(&sum_program()).expect("machine");
    machine.run(100).expect("run");
    assert!(machine.halted());

    let cycle = machine.read_cycle();
    let log = machine.step().expect("step");
    assert!(log.accesses.is_empty());
    assert_eq!(log.notes, vec!["machine is halted".to_owned()]);
    assert_eq!(machine.read_cycle(), cycle);
}

#[test]
fn invalid_opcode_is_a_machine_error() {
    let config = MachineConfig {
        memory_log2_size: 9,
        program: vec![0xff],
        entry_point: 0,
        registers: Vec::new(),
    };
    let mut machine = WordMachine::new(&config).expect("machine");
    let err = machine.step().expect_err("invalid opcode");
    assert_eq!(err.kind_str(), "machine");
}

#[test]
fn out_of_range_address_is_a_machine_error() {
    let config = MachineConfig {
        memory_log2_size: 9,
        program: vec![load(1, 0x00ff_ffff)],
        entry_point: 0,
        registers: Vec::new(),
    };
    let mut machine = WordMachine::new(&config).expect("machine");
    assert!(machine.step().is_err());
}

#[test]
fn jump_redirects_the_program_counter() {
    let config = MachineConfig {
        memory_log2_size: 9,
        program: vec![jump(3), 0, 0, halt()],
        entry_point: 0,
        registers: Vec::new(),
    };
    let mut machine = WordMachine::new(&config).expect("machine");
    machine.step().expect("jump");
    assert_eq!(machine.read_pc(), 3 << 3);
    machine.step().expect("halt");
    assert!(machine.halted());
}

#[test]
fn register_seeds_are_applied() {
    let config = MachineConfig {
        memory_log2_size: 9,
        program: vec![out(1), halt()],
        entry_point: 0,
        registers: vec![0, 42],
    };
    let mut machine = WordMachine::new(&config).expect("machine");
    machine.run(10).expect("run");
    assert_eq!(machine.read_output(), 42);
}
