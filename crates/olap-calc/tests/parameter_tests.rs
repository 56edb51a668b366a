mod common;

use common::cube;
use olap_calc::{
    CalcValue, CompileCx, CompileError, EvalError, Evaluator, ExpCompiler, Exp, Parameter, Type,
};
use olap_model::Value;
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn repeated_references_share_one_slot() {
    let cube = cube();
    let compiler = cube.base_compiler().with_parameters([
        Parameter::new("Threshold", Type::NUMERIC, Exp::integer(10)),
        Parameter::new("Label", Type::STRING, Exp::string("none")),
    ]);
    let cx = CompileCx::new(&compiler);

    let first = cx.register_parameter("Threshold").unwrap();
    let label = cx.register_parameter("Label").unwrap();
    let again = cx.register_parameter("Threshold").unwrap();

    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(first.index(), 0);
    assert_eq!(label.index(), 1);
    assert_eq!(compiler.state().parameters().len(), 2);
}

#[test]
fn slots_are_numbered_in_registration_order() {
    let cube = cube();
    let compiler = cube.base_compiler().with_parameters([
        Parameter::new("A", Type::NUMERIC, Exp::integer(1)),
        Parameter::new("B", Type::NUMERIC, Exp::integer(2)),
    ]);
    let cx = CompileCx::new(&compiler);

    // B is referenced first.
    let sum = cube.infix(
        Exp::parameter("B", Type::NUMERIC),
        "+",
        Exp::parameter("A", Type::NUMERIC),
    );
    cx.compile(&sum).unwrap();

    let registry = compiler.state().parameters();
    let names: Vec<_> = registry
        .slots()
        .iter()
        .map(|slot| (slot.index(), slot.parameter().name().to_string()))
        .collect();
    assert_eq!(names, vec![(0, "B".to_string()), (1, "A".to_string())]);
}

#[test]
fn unknown_parameters_are_rejected() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);

    let err = cx
        .compile(&Exp::parameter("Missing", Type::NUMERIC))
        .unwrap_err();
    assert_eq!(err, CompileError::UnknownParameter("Missing".to_string()));
}

#[test]
fn assigned_value_overrides_the_cached_default() {
    let cube = cube();
    let compiler = cube
        .base_compiler()
        .with_parameters([Parameter::new("Threshold", Type::NUMERIC, Exp::integer(10))]);
    let cx = CompileCx::new(&compiler);
    let mut ev = cube.evaluator();

    let calc = cx
        .compile_double(&Exp::parameter("Threshold", Type::NUMERIC))
        .unwrap();
    let slot = compiler.state().parameters().slot("Threshold").unwrap();

    assert_eq!(calc.evaluate_double(&mut ev).unwrap(), Some(10.0));
    assert!(slot.cached_default_value().is_some());
    assert!(!slot.is_assigned());

    slot.set_value(Value::Double(25.0));
    assert_eq!(calc.evaluate_double(&mut ev).unwrap(), Some(25.0));

    slot.unset_value();
    assert_eq!(calc.evaluate_double(&mut ev).unwrap(), Some(10.0));

    slot.set_cached_default_value(Value::Integer(3));
    assert_eq!(calc.evaluate_double(&mut ev).unwrap(), Some(3.0));
    slot.invalidate_cached_default();
    assert_eq!(calc.evaluate_double(&mut ev).unwrap(), Some(10.0));
}

#[test]
fn default_depending_on_context_is_computed_once() {
    let cube = cube();
    let sales = cube.member(cube.sales);
    let compiler = cube
        .base_compiler()
        .with_parameters([Parameter::new("Target", Type::NUMERIC, sales)]);
    let cx = CompileCx::new(&compiler);
    let mut ev = cube.evaluator();

    let calc = cx
        .compile_double(&Exp::parameter("Target", Type::NUMERIC))
        .unwrap();
    assert_eq!(calc.evaluate_double(&mut ev).unwrap(), Some(57.0));

    // The default was cached at the first evaluation.
    ev.set_context(cube.y1998);
    assert_eq!(calc.evaluate_double(&mut ev).unwrap(), Some(57.0));

    let slot = compiler.state().parameters().slot("Target").unwrap();
    slot.invalidate_cached_default();
    assert_eq!(calc.evaluate_double(&mut ev).unwrap(), Some(7.0));
}

#[test]
fn numeric_parameter_with_string_default_is_cast() {
    let cube = cube();
    let compiler = cube
        .base_compiler()
        .with_parameters([Parameter::new("Limit", Type::NUMERIC, Exp::string("42"))]);
    let cx = CompileCx::new(&compiler);
    let mut ev = cube.evaluator();

    let slot = cx.register_parameter("Limit").unwrap();
    assert_eq!(slot.default_calc().unwrap().name(), "CastToNumeric");
    assert_eq!(
        slot.evaluate(&mut ev).unwrap(),
        CalcValue::Scalar(Value::Double(42.0))
    );
}

#[test]
fn member_parameters_evaluate_to_members() {
    let cube = cube();
    let default = cube.member(cube.y1997);
    let ty = default.ty().clone();
    let compiler = cube
        .base_compiler()
        .with_parameters([Parameter::new("Year", ty.clone(), default)]);
    let cx = CompileCx::new(&compiler);
    let mut ev = cube.evaluator();

    let member = cx.compile_member(&Exp::parameter("Year", ty.clone())).unwrap();
    assert_eq!(member.evaluate_member(&mut ev).unwrap(), cube.y1997);

    let slot = compiler.state().parameters().slot("Year").unwrap();
    slot.set_value(cube.y1998);
    assert_eq!(member.evaluate_member(&mut ev).unwrap(), cube.y1998);

    let value = cx.compile_double(&Exp::parameter("Year", ty)).unwrap();
    assert_eq!(value.evaluate_double(&mut ev).unwrap(), Some(7.0));
}

#[test]
fn self_referencing_default_compiles_and_fails_at_evaluation() {
    let cube = cube();
    let compiler = cube.base_compiler().with_parameters([Parameter::new(
        "Loop",
        Type::NUMERIC,
        Exp::parameter("Loop", Type::NUMERIC),
    )]);
    let cx = CompileCx::new(&compiler);
    let mut ev = cube.evaluator();

    let calc = cx
        .compile_double(&Exp::parameter("Loop", Type::NUMERIC))
        .unwrap();
    assert_eq!(compiler.state().parameters().len(), 1);

    let err = calc.evaluate_double(&mut ev).unwrap_err();
    assert!(matches!(err, EvalError::Recursion(_)), "{err:?}");

    // Assigning a value breaks the cycle.
    let slot = compiler.state().parameters().slot("Loop").unwrap();
    slot.set_value(Value::Double(1.0));
    assert_eq!(calc.evaluate_double(&mut ev).unwrap(), Some(1.0));
}

#[test]
fn invalid_default_reports_the_parameter() {
    let cube = cube();
    let compiler = cube.base_compiler().with_parameters([Parameter::new(
        "Year",
        Type::member(),
        Exp::integer(1997),
    )]);
    let cx = CompileCx::new(&compiler);

    let err = cx.register_parameter("Year").unwrap_err();
    match err {
        CompileError::Parameter { parameter, source } => {
            assert_eq!(parameter, "Year");
            assert!(matches!(*source, CompileError::StaticType { .. }));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn failed_default_keeps_failing_on_later_references() {
    let cube = cube();
    let compiler = cube.base_compiler().with_parameters([Parameter::new(
        "Year",
        Type::member(),
        Exp::integer(1997),
    )]);
    let cx = CompileCx::new(&compiler);

    let first = cx.register_parameter("Year").unwrap_err();
    assert!(matches!(first, CompileError::Parameter { .. }), "{first:?}");
    assert_eq!(cx.register_parameter("Year").unwrap_err(), first);

    let reference = cx
        .compile(&Exp::parameter("Year", Type::member()))
        .unwrap_err();
    assert_eq!(reference, first);

    let slot = compiler.state().parameters().slot("Year").unwrap();
    assert!(slot.default_calc().is_none());
    assert_eq!(slot.default_error(), Some(&first));
}
