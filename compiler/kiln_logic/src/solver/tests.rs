#![allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

use std::convert::Infallible;

use super::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn var(n: u32) -> LogicVarId {
    LogicVarId::from_raw(n)
}

const EVEN: PredId = PredId::from_raw(0);
const SAME_PARITY: PredId = PredId::from_raw(1);
const DIFFERENT: PredId = PredId::from_raw(2);
const FAILING: PredId = PredId::from_raw(3);

/// Integer predicates that count how often they are invoked.
#[derive(Default)]
struct Ints {
    unary_calls: usize,
    binary_calls: usize,
}

impl Predicates<i32> for Ints {
    type Error = String;

    fn unary(&mut self, pred: PredId, value: &i32) -> Result<bool, String> {
        self.unary_calls += 1;
        match pred {
            EVEN => Ok(value % 2 == 0),
            _ => Err(format!("unknown unary {pred:?}")),
        }
    }

    fn binary(&mut self, pred: PredId, a: &i32, b: &i32) -> Result<bool, String> {
        self.binary_calls += 1;
        match pred {
            SAME_PARITY => Ok(a % 2 == b % 2),
            DIFFERENT => Ok(a != b),
            _ => Err(format!("unknown binary {pred:?}")),
        }
    }
}

struct NoPredicates;

impl Predicates<i32> for NoPredicates {
    type Error = Infallible;

    fn unary(&mut self, _: PredId, _: &i32) -> Result<bool, Infallible> {
        Ok(true)
    }

    fn binary(&mut self, _: PredId, a: &i32, b: &i32) -> Result<bool, Infallible> {
        Ok(a == b)
    }
}

fn solve(eq: &Equation<i32>) -> Outcome<i32> {
    Solver::default().solve(eq, &[], &mut NoPredicates).unwrap()
}

fn assigned(outcome: &Outcome<i32>, v: LogicVarId) -> Option<i32> {
    match outcome {
        Outcome::Solved(assignment) => assignment.get(v).copied(),
        Outcome::Failed(_) => None,
    }
}

#[test]
fn equality_bind_intersects_domains() {
    let (x, y) = (var(0), var(1));
    let eq = Equation::all([
        Equation::domain(x, [1, 2, 3]),
        Equation::domain(y, [2, 3, 4]),
        Equation::bind(x, y),
    ]);

    let domains = Solver::default()
        .satisfiable_domains(&eq, &[], &mut NoPredicates)
        .unwrap()
        .unwrap();
    assert_eq!(domains.get(x), Some(&[2, 3][..]));
    assert_eq!(domains.get(y), Some(&[2, 3][..]));

    let outcome = solve(&eq);
    assert_eq!(assigned(&outcome, x), Some(2));
    assert_eq!(assigned(&outcome, y), Some(2));
}

#[test]
fn further_domain_makes_bind_inconsistent() {
    let (x, y) = (var(0), var(1));
    let trailing_line = line!() + 5;
    let eq = Equation::all([
        Equation::domain(x, [1, 2, 3]),
        Equation::domain(y, [2, 3, 4]),
        Equation::bind(x, y),
        Equation::domain(x, [5]),
    ]);

    match solve(&eq) {
        Outcome::Failed(failure) => {
            assert_eq!(failure.reason, FailureReason::EmptyDomain);
            assert_eq!(failure.var, Some(x));
            assert_eq!(failure.origin.unwrap().line, trailing_line);
        }
        Outcome::Solved(a) => panic!("unexpected solution {a:?}"),
    }
}

#[test]
fn or_branches_are_tried_in_declaration_order() {
    let x = var(0);
    let eq = Equation::any([Equation::domain(x, [7]), Equation::domain(x, [3])]);
    assert_eq!(assigned(&solve(&eq), x), Some(7));

    // First alternative inconsistent: the second one wins.
    let eq = Equation::domain(x, [3, 4]).and(Equation::any([
        Equation::domain(x, [7]),
        Equation::domain(x, [4]),
    ]));
    assert_eq!(assigned(&solve(&eq), x), Some(4));
}

#[test]
fn satisfiable_domains_union_branches_without_duplicates() {
    let x = var(0);
    let eq = Equation::any([
        Equation::domain(x, [1, 2]),
        Equation::domain(x, [9]).and(Equation::domain(x, [8])),
        Equation::domain(x, [2, 3]),
    ]);
    let domains = Solver::default()
        .satisfiable_domains(&eq, &[], &mut NoPredicates)
        .unwrap()
        .unwrap();
    assert_eq!(domains.get(x), Some(&[1, 2, 3][..]));
}

#[test]
fn unsatisfiable_has_no_domains() {
    let x = var(0);
    let eq = Equation::domain(x, [1]).and(Equation::domain(x, [2]));
    let domains = Solver::default()
        .satisfiable_domains(&eq, &[], &mut NoPredicates)
        .unwrap();
    assert!(domains.is_none());
}

#[test]
fn predicate_waits_for_candidates() {
    let x = var(0);
    // The predicate comes first but can only filter once the domain exists.
    let eq = Equation::predicate(x, EVEN).and(Equation::domain(x, [1, 3, 4]));
    let mut preds = Ints::default();
    let outcome = Solver::default().solve(&eq, &[], &mut preds).unwrap();
    assert_eq!(assigned(&outcome, x), Some(4));
    assert_eq!(preds.unary_calls, 3);
}

#[test]
fn unconstrained_variable_fails() {
    let (x, y) = (var(0), var(1));
    let eq = Equation::<i32>::bind(x, y);
    match solve(&eq) {
        Outcome::Failed(failure) => {
            assert_eq!(failure.reason, FailureReason::Unconstrained);
            assert_eq!(failure.var, Some(x));
        }
        Outcome::Solved(a) => panic!("unexpected solution {a:?}"),
    }
}

#[test]
fn bound_variables_start_as_singletons() {
    let (x, y) = (var(0), var(1));
    let eq = Equation::domain(y, [1, 2, 3]).and(Equation::bind(x, y));
    let outcome = Solver::default()
        .solve(&eq, &[(x, 3)], &mut NoPredicates)
        .unwrap();
    assert_eq!(assigned(&outcome, y), Some(3));
}

#[test]
fn eq_predicate_results_are_cached_per_solve() {
    let (x, y) = (var(0), var(1));
    let eq = Equation::all([
        Equation::domain(x, [1, 2]),
        Equation::domain(y, [3, 4]),
        Equation::bind_with(x, y, SAME_PARITY),
    ]);
    let mut preds = Ints::default();
    let outcome = Solver::default().solve(&eq, &[], &mut preds).unwrap();

    assert_eq!(assigned(&outcome, x), Some(1));
    assert_eq!(assigned(&outcome, y), Some(3));
    // Four distinct pairs exist; propagation and labeling revisit them.
    assert!(preds.binary_calls <= 4, "calls: {}", preds.binary_calls);
}

#[test]
fn eq_bind_outcome_does_not_depend_on_atom_order() {
    let (x, y) = (var(0), var(1));
    let orders = [
        Equation::all([
            Equation::domain(y, [2]),
            Equation::bind_with(x, y, SAME_PARITY),
            Equation::domain(x, [4]),
        ]),
        Equation::all([
            Equation::domain(y, [2]),
            Equation::domain(x, [4]),
            Equation::bind_with(x, y, SAME_PARITY),
        ]),
        Equation::all([
            Equation::bind_with(x, y, SAME_PARITY),
            Equation::domain(x, [4]),
            Equation::domain(y, [2]),
        ]),
    ];
    for eq in &orders {
        let outcome = Solver::default()
            .solve(eq, &[], &mut Ints::default())
            .unwrap();
        assert_eq!(assigned(&outcome, x), Some(4));
        assert_eq!(assigned(&outcome, y), Some(2));
    }
}

#[test]
fn eq_bind_does_not_hand_candidates_to_a_free_partner() {
    let (x, y) = (var(0), var(1));
    let eq = Equation::all([
        Equation::domain(x, [1, 3]),
        Equation::bind_with(x, y, SAME_PARITY),
    ]);
    let outcome = Solver::default()
        .solve(&eq, &[], &mut Ints::default())
        .unwrap();
    match outcome {
        Outcome::Failed(failure) => {
            assert_eq!(failure.var, Some(y));
            assert_eq!(failure.reason, FailureReason::Unconstrained);
        }
        Outcome::Solved(assignment) => panic!("unexpected solution {assignment:?}"),
    }
}

#[test]
fn labeling_backtracks() {
    let (x, y, z) = (var(0), var(1), var(2));
    // Arc consistent as stated, but x = 1 leaves y and z both needing 3.
    let eq = Equation::all([
        Equation::domain(x, [1, 2]),
        Equation::domain(y, [1, 3]),
        Equation::domain(z, [1, 3]),
        Equation::bind_with(x, y, DIFFERENT),
        Equation::bind_with(x, z, DIFFERENT),
        Equation::bind_with(y, z, DIFFERENT),
    ]);
    let outcome = Solver::default()
        .solve(&eq, &[], &mut Ints::default())
        .unwrap();
    assert_eq!(assigned(&outcome, x), Some(2));
    assert_eq!(assigned(&outcome, y), Some(1));
    assert_eq!(assigned(&outcome, z), Some(3));
}

#[test]
fn predicate_errors_propagate() {
    let x = var(0);
    let eq = Equation::domain(x, [1]).and(Equation::predicate(x, FAILING));
    let err = Solver::default()
        .solve(&eq, &[], &mut Ints::default())
        .unwrap_err();
    assert!(matches!(err, SolveError::Predicate(_)));
}

#[test]
fn branch_budget_is_enforced() {
    let alternatives = |v: u32| {
        Equation::any([
            Equation::domain(var(v), [1]),
            Equation::domain(var(v), [2]),
        ])
    };
    // Each conjunct doubles the branches; the last one is unsatisfiable so
    // every combination must be explored.
    let eq = Equation::all(
        (0..12)
            .map(alternatives)
            .chain([Equation::False]),
    );
    let solver = Solver::new(SolverConfig { max_branches: 64 });
    let err = solver.solve(&eq, &[], &mut NoPredicates).unwrap_err();
    assert_eq!(err, SolveError::TooManyBranches { limit: 64 });
}

#[test]
fn false_fails_without_origin() {
    match solve(&Equation::False) {
        Outcome::Failed(failure) => assert_eq!(failure.reason, FailureReason::False),
        Outcome::Solved(_) => panic!("False cannot be solved"),
    }
    assert!(solve(&Equation::True).is_solved());
}

proptest! {
    #[test]
    fn bind_solution_lies_in_both_domains(
        xs in proptest::collection::vec(0i32..8, 1..6),
        ys in proptest::collection::vec(0i32..8, 1..6),
    ) {
        let (x, y) = (var(0), var(1));
        let eq = Equation::all([
            Equation::domain(x, xs.clone()),
            Equation::domain(y, ys.clone()),
            Equation::bind(x, y),
        ]);
        let common: Vec<i32> = dedup(&xs).into_iter().filter(|v| ys.contains(v)).collect();

        match solve(&eq) {
            Outcome::Solved(assignment) => {
                let vx = *assignment.get(x).unwrap();
                prop_assert_eq!(Some(&vx), assignment.get(y));
                prop_assert!(common.contains(&vx));
                prop_assert_eq!(Some(&vx), common.first());
            }
            Outcome::Failed(_) => prop_assert!(common.is_empty()),
        }

        let domains = Solver::default()
            .satisfiable_domains(&eq, &[], &mut NoPredicates)
            .unwrap();
        match domains {
            Some(domains) => prop_assert_eq!(domains.get(x), Some(common.as_slice())),
            None => prop_assert!(common.is_empty()),
        }
    }
}
