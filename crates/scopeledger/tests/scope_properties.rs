//! Property tests: random programs of open/declare/close against a simple
//! stack-of-vectors model of the expected release order.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::collection::vec;
use proptest::prelude::*;
use scopeledger::{LedgerConfig, LedgerError, ScopeContext};

const LABELS: [&str; 8] = ["r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7"];

#[derive(Debug, Clone, Copy)]
enum Op {
    Open,
    Declare(usize),
    Close,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => Just(Op::Open),
        3 => (0..LABELS.len()).prop_map(Op::Declare),
        1 => Just(Op::Close),
    ]
}

/// Expected release order and per-declaration release counts.
struct Model {
    scopes: Vec<Vec<usize>>,
    released: Vec<usize>,
}

impl Model {
    fn close(&mut self) {
        if let Some(ids) = self.scopes.pop() {
            self.released.extend(ids.into_iter().rev());
        }
    }
}

/// Runs `ops` against both the context and the model. Operations the
/// context rejects for capacity are skipped in the model too.
fn run_program(ops: &[Op], config: LedgerConfig) -> (Vec<usize>, Vec<usize>, Vec<u32>) {
    let released = Rc::new(RefCell::new(Vec::new()));
    let counts = Rc::new(RefCell::new(Vec::new()));
    let mut model = Model {
        scopes: Vec::new(),
        released: Vec::new(),
    };
    let mut ctx = ScopeContext::with_config(config).unwrap();
    let mut next_id = 0_usize;

    for op in ops {
        match *op {
            Op::Open => match ctx.open_scope() {
                Ok(_) => model.scopes.push(Vec::new()),
                Err(err) => assert!(err.is_capacity_violation()),
            },
            Op::Declare(label) => {
                let id = next_id;
                let sink = Rc::clone(&released);
                let counter = Rc::clone(&counts);
                let outcome = ctx.declare(
                    LABELS[label],
                    || id,
                    move |value| {
                        sink.borrow_mut().push(value);
                        counter.borrow_mut()[value] += 1;
                    },
                );
                match outcome {
                    Ok(_) => {
                        counts.borrow_mut().push(0);
                        next_id += 1;
                        match model.scopes.last_mut() {
                            Some(scope) => scope.push(id),
                            None => panic!("declare succeeded with no open scope"),
                        }
                    }
                    Err(LedgerError::NoOpenScope) => assert!(model.scopes.is_empty()),
                    Err(err) => assert!(err.is_capacity_violation()),
                }
            }
            Op::Close => match ctx.close_scope() {
                Ok(_) => model.close(),
                Err(err) => {
                    assert_eq!(err, LedgerError::NoOpenScope);
                    assert!(model.scopes.is_empty());
                }
            },
        }
        assert_eq!(ctx.depth(), model.scopes.len());
    }

    let report = ctx.finish();
    assert!(report.is_success());
    while !model.scopes.is_empty() {
        model.close();
    }

    let released = released.borrow().clone();
    let counts = counts.borrow().clone();
    (released, model.released, counts)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn prop_release_order_matches_stack_model(ops in vec(op_strategy(), 0..64)) {
        let (actual, expected, _) = run_program(&ops, LedgerConfig::new(16, 4));
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn prop_every_declaration_released_exactly_once(ops in vec(op_strategy(), 0..64)) {
        let (_, _, counts) = run_program(&ops, LedgerConfig::new(16, 4));
        prop_assert!(counts.iter().all(|&c| c == 1), "release counts: {:?}", counts);
    }

    #[test]
    fn prop_single_scope_reverses_declarations(n in 0_usize..=32) {
        let released = Rc::new(RefCell::new(Vec::new()));
        let mut ctx = ScopeContext::with_config(LedgerConfig::new(32, 1)).unwrap();
        ctx.open_scope().unwrap();
        for i in 0..n {
            let sink = Rc::clone(&released);
            ctx.declare("r", || i, move |v| sink.borrow_mut().push(v)).unwrap();
        }
        prop_assert_eq!(ctx.close_scope().unwrap(), n);
        let expected: Vec<usize> = (0..n).rev().collect();
        prop_assert_eq!(&*released.borrow(), &expected);
    }

    #[test]
    fn prop_capacity_violation_at_exact_bound(capacity in 1_usize..32, depth in 1_usize..8) {
        let mut ctx = ScopeContext::with_config(LedgerConfig::new(capacity, depth)).unwrap();
        for _ in 0..depth {
            ctx.open_scope().unwrap();
        }
        prop_assert_eq!(
            ctx.open_scope().unwrap_err(),
            LedgerError::ScopeDepthExceeded { max: depth }
        );
        for _ in 0..capacity {
            ctx.defer("slot", || {}).unwrap();
        }
        prop_assert_eq!(
            ctx.defer("slot", || {}).unwrap_err(),
            LedgerError::LedgerFull { capacity }
        );
        prop_assert_eq!(ctx.finish().drained, capacity);
    }

    #[test]
    fn prop_error_signal_selects_error_block(signal_at in proptest::option::of(0_usize..8)) {
        let mut ctx = ScopeContext::new();
        ctx.open_scope().unwrap();
        for i in 0..8 {
            if signal_at == Some(i) {
                ctx.signal_error();
            }
            ctx.defer("step", || {}).unwrap();
        }
        let path = ctx.exit(|| "success", |_| "error");
        let expected = if signal_at.is_some() { "error" } else { "success" };
        prop_assert_eq!(path, expected);
    }
}
