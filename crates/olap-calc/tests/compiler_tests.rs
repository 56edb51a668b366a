mod common;

use common::cube;
use olap_calc::{
    Calc, CalcKind, CalcResult, CalcValue, CellReader, CompileCx, CompileError, ContextEvaluator,
    EvalError, EvaluatorSettings, Evaluator, Exp, RefinedCompiler, ResultStyles, Syntax, Type,
};
use olap_model::{MemberId, Schema, Value};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn compile_as_with_the_expression_type_is_plain_compile() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);

    let exp = cube.infix(Exp::integer(1), "+", cube.member(cube.sales));
    let plain = cx.compile(&exp).unwrap();
    let same = cx
        .compile_as(&exp, Some(exp.ty()), ResultStyles::VALUE)
        .unwrap();
    assert_eq!(same.kind(), plain.kind());
    assert_eq!(same.name(), plain.name());
    assert_eq!(same.explain(), plain.explain());
}

#[test]
fn numeric_literals_fold_into_constants() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);
    let mut ev = cube.evaluator();

    let d = cx.compile_double(&Exp::integer(7)).unwrap();
    assert_eq!(d.constant(), Some(&CalcValue::Scalar(Value::Double(7.0))));

    let i = cx.compile_integer(&Exp::double(2.9)).unwrap();
    assert_eq!(i.constant(), Some(&CalcValue::Scalar(Value::Integer(2))));
    assert_eq!(i.evaluate_integer(&mut ev).unwrap(), Some(2));

    let i = cx.compile_integer(&Exp::double(-2.9)).unwrap();
    assert_eq!(i.evaluate_integer(&mut ev).unwrap(), Some(-2));

    let b = cx.compile_boolean(&Exp::integer(0)).unwrap();
    assert_eq!(b.evaluate_boolean(&mut ev).unwrap(), false);
    let b = cx.compile_boolean(&Exp::double(0.5)).unwrap();
    assert_eq!(b.evaluate_boolean(&mut ev).unwrap(), true);
}

#[test]
fn folding_an_out_of_range_constant_is_a_static_error() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);

    let err = cx.compile_integer(&Exp::double(1e12)).unwrap_err();
    assert!(matches!(err, CompileError::StaticType { .. }), "{err:?}");
}

#[test]
fn wide_integer_literals_compile_as_doubles() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);

    let calc = cx.compile(&Exp::integer(5_000_000_000)).unwrap();
    assert_eq!(calc.kind(), CalcKind::Double);
    assert_eq!(
        calc.constant(),
        Some(&CalcValue::Scalar(Value::Double(5e9)))
    );

    let small = cx.compile(&Exp::integer(42)).unwrap();
    assert_eq!(small.kind(), CalcKind::Integer);
}

#[test]
fn arithmetic_on_constants_folds() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);

    let exp = cube.infix(Exp::integer(1), "+", Exp::double(2.5));
    let calc = cx.compile(&exp).unwrap();
    assert!(calc.is_constant(), "{}", calc.explain());
    assert_eq!(
        calc.constant(),
        Some(&CalcValue::Scalar(Value::Double(3.5)))
    );
}

#[test]
fn incompatible_targets_are_static_type_errors() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);

    let err = cx.compile_member(&Exp::integer(1)).err().unwrap();
    assert!(matches!(err, CompileError::StaticType { .. }));

    let err = cx.compile_list(&Exp::integer(1), false).err().unwrap();
    match err {
        CompileError::StaticType { to, .. } => assert_eq!(to, "SET"),
        other => panic!("unexpected error {other:?}"),
    }

    let err = cx.compile_scalar(&cube.members(cube.year), false).unwrap_err();
    assert!(matches!(err, CompileError::StaticType { .. }));

    let err = cx.compile_string(&Exp::integer(1)).err().unwrap();
    assert!(matches!(err, CompileError::StaticType { .. }));
}

#[test]
fn constant_hierarchy_to_member_skips_the_hierarchy_lookup() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);
    let mut ev = cube.evaluator();

    let member = cx.compile_member(&cube.hierarchy(cube.time)).unwrap();
    assert_eq!(member.name(), "HierarchyCurrentMemberFixed");

    let all_times = cube.schema.default_member(cube.time);
    assert_eq!(member.evaluate_member(&mut ev).unwrap(), all_times);
    ev.set_context(cube.y1998);
    assert_eq!(member.evaluate_member(&mut ev).unwrap(), cube.y1998);
}

#[test]
fn level_and_dimension_resolve_to_their_hierarchy() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);

    let from_level = cx.compile_hierarchy(&cube.level(cube.quarter)).unwrap();
    assert_eq!(
        from_level.constant(),
        Some(&CalcValue::Hierarchy(cube.time))
    );

    let from_dimension = cx
        .compile_hierarchy(&Exp::dimension(cube.product_dim))
        .unwrap();
    assert_eq!(
        from_dimension.constant(),
        Some(&CalcValue::Hierarchy(cube.product))
    );
}

#[test]
fn dimension_with_several_hierarchies_is_ambiguous() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);

    let err = cx
        .compile_hierarchy(&Exp::dimension(cube.store_dim))
        .err()
        .unwrap();
    match err {
        CompileError::StaticType { to, .. } => assert_eq!(to, "HIERARCHY"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn member_as_scalar_reads_its_cell() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);
    let mut ev = cube.evaluator();

    let calc = cx.compile_scalar(&cube.member(cube.y1997), false).unwrap();
    assert_eq!(calc.name(), "MemberValue");
    let before = ev.context();
    assert_eq!(calc.evaluate_scalar(&mut ev).unwrap(), Value::Double(50.0));
    assert_eq!(ev.context(), before);

    let d = cx.compile_double(&cube.member(cube.cost)).unwrap();
    assert_eq!(d.name(), "ValueToDouble");
    assert_eq!(d.evaluate_double(&mut ev).unwrap(), Some(34.0));
}

#[test]
fn tuple_as_scalar_reads_the_cell_at_every_member() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);
    let mut ev = cube.evaluator();

    let constant = Exp::call(
        &cube.schema,
        olap_calc::FunTable::standard()
            .lookup("()", Syntax::Parentheses)
            .unwrap()
            .clone(),
        vec![cube.member(cube.q1_1997), cube.member(cube.food)],
    )
    .unwrap();
    let calc = cx.compile_scalar(&constant, false).unwrap();
    assert_eq!(calc.name(), "TupleValue");
    assert_eq!(calc.evaluate_scalar(&mut ev).unwrap(), Value::Double(20.0));

    let time_member = cube.property(cube.hierarchy(cube.time), "CurrentMember");
    let dynamic = cube.call(
        "()",
        Syntax::Parentheses,
        vec![time_member, cube.member(cube.drink)],
    );
    let calc = cx.compile_scalar(&dynamic, false).unwrap();
    assert_eq!(calc.name(), "MemberArrayValue");
    ev.set_context(cube.q2_1997);
    assert_eq!(calc.evaluate_scalar(&mut ev).unwrap(), Value::Double(5.0));
    assert_eq!(ev.context_member(cube.product), cube.schema.default_member(cube.product));
}

/// Cell store that fails every read.
struct Offline;

impl CellReader for Offline {
    fn cell_value(&self, _schema: &Schema, _coordinates: &[MemberId]) -> CalcResult<Value> {
        Err(EvalError::Storage("offline".to_string()))
    }
}

#[test]
fn context_is_restored_when_a_cell_read_fails() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);
    let mut ev = ContextEvaluator::new(
        cube.schema.clone(),
        Arc::new(Offline),
        EvaluatorSettings::default(),
    );

    let tuple = cube.call(
        "()",
        Syntax::Parentheses,
        vec![cube.member(cube.y1997), cube.member(cube.food)],
    );
    let calc = cx.compile_scalar(&tuple, false).unwrap();
    let before = ev.context();
    let err = calc.evaluate_scalar(&mut ev).unwrap_err();
    assert_eq!(err, EvalError::Storage("offline".to_string()));
    assert_eq!(ev.context(), before);
}

#[test]
fn base_compiler_rejects_hierarchy_as_tuple() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);

    let err = cx.compile_tuple(&cube.hierarchy(cube.product)).err().unwrap();
    assert!(matches!(err, CompileError::StaticType { .. }));
}

#[test]
fn refined_compiler_builds_default_member_tuples() {
    let cube = cube();
    let compiler = RefinedCompiler::new(cube.base_compiler());
    let cx = CompileCx::new(&compiler);
    let mut ev = cube.evaluator();

    let tuple = cx.compile_tuple(&cube.hierarchy(cube.product)).unwrap();
    let all_products = cube.schema.default_member(cube.product);
    assert_eq!(
        tuple.constant(),
        Some(&CalcValue::Tuple([all_products].into_iter().collect()))
    );

    let tuple = cx.compile_tuple(&Exp::dimension(cube.time_dim)).unwrap();
    let all_times = cube.schema.default_member(cube.time);
    assert_eq!(tuple.evaluate_tuple(&mut ev).unwrap().as_slice(), &[all_times]);

    let tuple = cx.compile_tuple(&cube.member(cube.y1998)).unwrap();
    assert_eq!(tuple.name(), "MemberTuple");
    assert_eq!(tuple.evaluate_tuple(&mut ev).unwrap().as_slice(), &[cube.y1998]);
}

#[test]
fn scalar_types_select_the_specific_calc_kind() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);

    let cases = [
        (Exp::boolean(true), CalcKind::Boolean),
        (Exp::integer(3), CalcKind::Integer),
        (Exp::double(3.5), CalcKind::Double),
        (Exp::string("x"), CalcKind::String),
    ];
    for (exp, kind) in cases {
        assert_eq!(cx.compile_scalar(&exp, true).unwrap().kind(), kind);
    }

    let value = cx
        .compile_as(&Exp::integer(3), Some(&Type::VALUE), ResultStyles::VALUE)
        .unwrap();
    assert_eq!(value.kind(), CalcKind::Integer);

    let calc: Calc = cx.compile_scalar(&cube.member(cube.sales), true).unwrap();
    assert_eq!(calc.kind(), CalcKind::Value);
}
