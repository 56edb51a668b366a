mod common;

use common::{cube, Cube};
use olap_calc::{
    CalcValue, CompileCx, CompileError, ContextEvaluator, Evaluator, Exp, FunDef, FunTable,
    Syntax,
};
use olap_model::{MemberId, Value};
use pretty_assertions::assert_eq;

fn eval(cube: &Cube, exp: &Exp) -> Value {
    let compiler = cube.base_compiler();
    let calc = CompileCx::new(&compiler).compile_scalar(exp, false).unwrap();
    calc.evaluate_scalar(&mut cube.evaluator()).unwrap()
}

fn eval_in(cube: &Cube, ev: &mut ContextEvaluator, exp: &Exp) -> Value {
    let compiler = cube.base_compiler();
    let calc = CompileCx::new(&compiler).compile_scalar(exp, false).unwrap();
    calc.evaluate_scalar(ev).unwrap()
}

fn members(cube: &Cube, exp: &Exp) -> Vec<MemberId> {
    let compiler = cube.base_compiler();
    let list = CompileCx::new(&compiler).compile_list(exp, false).unwrap();
    let list = list.evaluate_list(&mut cube.evaluator()).unwrap();
    list.members().collect()
}

#[test]
fn sum_over_members_reads_each_cell() {
    let cube = cube();
    let sum = cube.fun("Sum", vec![cube.members(cube.year)]);
    assert_eq!(eval(&cube, &sum), Value::Double(57.0));

    let costs = cube.fun(
        "Sum",
        vec![cube.members(cube.year), cube.member(cube.cost)],
    );
    assert_eq!(eval(&cube, &costs), Value::Double(34.0));
}

#[test]
fn sum_of_empty_cells_is_empty() {
    let cube = cube();
    let set = cube.call(
        "{}",
        Syntax::Braces,
        vec![cube.member(cube.y1998)],
    );
    let sum = cube.fun("Sum", vec![set, cube.member(cube.profit)]);
    assert_eq!(eval(&cube, &sum), Value::Null);
}

#[test]
fn filter_then_count() {
    let cube = cube();
    let condition = cube.infix(cube.member(cube.sales), ">=", Exp::integer(20));
    let filter = cube.fun("Filter", vec![cube.members(cube.quarter), condition]);
    assert_eq!(members(&cube, &filter), vec![cube.q1_1997, cube.q2_1997]);

    let count = cube.fun("Count", vec![filter]);
    assert_eq!(eval(&cube, &count), Value::Integer(2));
}

#[test]
fn filter_evaluates_the_condition_at_each_member() {
    let cube = cube();
    let name = cube.property(
        cube.property(cube.hierarchy(cube.time), "CurrentMember"),
        "Name",
    );
    let condition = cube.infix(name, "=", Exp::string("1998"));
    let filter = cube.fun("Filter", vec![cube.members(cube.year), condition]);
    assert_eq!(members(&cube, &filter), vec![cube.y1998]);
}

#[test]
fn order_sorts_by_key_in_either_direction() {
    let cube = cube();
    let quarters = cube.members(cube.quarter);
    let key = cube.member(cube.sales);

    let desc = cube.fun(
        "Order",
        vec![quarters.clone(), key.clone(), Exp::string("BDESC")],
    );
    assert_eq!(
        members(&cube, &desc),
        vec![cube.q1_1997, cube.q2_1997, cube.q1_1998]
    );

    let asc = cube.fun("Order", vec![quarters, key]);
    assert_eq!(
        members(&cube, &asc),
        vec![cube.q1_1998, cube.q2_1997, cube.q1_1997]
    );
}

#[test]
fn order_rejects_unknown_flags() {
    let cube = cube();
    let err = FunTable::standard()
        .call(
            &cube.schema,
            "Order",
            Syntax::Function,
            vec![
                cube.members(cube.year),
                cube.member(cube.sales),
                Exp::string("SIDEWAYS"),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, CompileError::InvalidArgument { index: 2, .. }), "{err:?}");
}

#[test]
fn head_takes_a_prefix() {
    let cube = cube();
    let ordered = cube.fun(
        "Order",
        vec![
            cube.members(cube.quarter),
            cube.member(cube.sales),
            Exp::string("DESC"),
        ],
    );
    let top = cube.fun("Head", vec![ordered.clone(), Exp::integer(2)]);
    assert_eq!(members(&cube, &top), vec![cube.q1_1997, cube.q2_1997]);

    let first = cube.fun("Head", vec![ordered]);
    assert_eq!(members(&cube, &first), vec![cube.q1_1997]);

    let all = cube.fun("Head", vec![cube.members(cube.year), Exp::integer(10)]);
    assert_eq!(members(&cube, &all), vec![cube.y1997, cube.y1998]);
}

#[test]
fn crossjoin_pairs_every_member() {
    let cube = cube();
    let joined = cube.fun(
        "CrossJoin",
        vec![cube.members(cube.year), cube.members(cube.family)],
    );
    let compiler = cube.base_compiler();
    let list = CompileCx::new(&compiler)
        .compile_list(&joined, false)
        .unwrap()
        .evaluate_list(&mut cube.evaluator())
        .unwrap();
    let tuples: Vec<Vec<MemberId>> = list.iter().map(|t| t.to_vec()).collect();
    assert_eq!(
        tuples,
        vec![
            vec![cube.y1997, cube.drink],
            vec![cube.y1997, cube.food],
            vec![cube.y1998, cube.drink],
            vec![cube.y1998, cube.food],
        ]
    );

    let summed = cube.fun("Sum", vec![joined]);
    assert_eq!(eval(&cube, &summed), Value::Double(57.0));
}

#[test]
fn crossjoin_rejects_a_repeated_hierarchy() {
    let cube = cube();
    let err = FunTable::standard()
        .call(
            &cube.schema,
            "CrossJoin",
            Syntax::Function,
            vec![cube.members(cube.year), cube.members(cube.quarter)],
        )
        .unwrap_err();
    assert!(matches!(err, CompileError::InvalidArgument { .. }), "{err:?}");
}

#[test]
fn set_constructor_drops_null_members() {
    let cube = cube();
    let null_time = cube.schema.hierarchy(cube.time).null_member();
    let set = cube.call(
        "{}",
        Syntax::Braces,
        vec![
            cube.member(cube.y1997),
            cube.property(cube.member(cube.y1997), "Parent"),
            cube.property(
                cube.property(cube.hierarchy(cube.time), "DefaultMember"),
                "Parent",
            ),
            cube.member(cube.q1_1998),
        ],
    );
    let all_times = cube.schema.default_member(cube.time);
    let result = members(&cube, &set);
    assert!(!result.contains(&null_time));
    assert_eq!(result, vec![cube.y1997, all_times, cube.q1_1998]);
}

#[test]
fn member_navigation() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);
    let mut ev = cube.evaluator();

    let parent = cube.property(cube.member(cube.q2_1997), "Parent");
    let calc = cx.compile_member(&parent).unwrap();
    assert_eq!(calc.constant(), Some(&CalcValue::Member(cube.y1997)));

    let current_parent = cube.property(
        cube.property(cube.hierarchy(cube.time), "CurrentMember"),
        "Parent",
    );
    let calc = cx.compile_member(&current_parent).unwrap();
    ev.set_context(cube.q1_1998);
    assert_eq!(calc.evaluate_member(&mut ev).unwrap(), cube.y1998);

    let children = cube.property(cube.member(cube.y1997), "Children");
    assert_eq!(members(&cube, &children), vec![cube.q1_1997, cube.q2_1997]);

    let level_name = cube.property(
        cube.property(cube.member(cube.q1_1998), "Level"),
        "Name",
    );
    assert_eq!(eval(&cube, &level_name), Value::String("Quarter".to_string()));

    let hierarchy = cube.property(cube.member(cube.usa), "Hierarchy");
    let calc = cx.compile_hierarchy(&hierarchy).unwrap();
    assert_eq!(calc.constant(), Some(&CalcValue::Hierarchy(cube.store)));

    let dimension = cube.property(cube.hierarchy(cube.store_type), "Dimension");
    let calc = cx.compile_dimension(&dimension).unwrap();
    assert_eq!(calc.constant(), Some(&CalcValue::Dimension(cube.store_dim)));
}

#[test]
fn hierarchy_members_are_listed_depth_first() {
    let cube = cube();
    let all_times = cube.schema.default_member(cube.time);
    let exp = cube.property(cube.hierarchy(cube.time), "Members");
    assert_eq!(
        members(&cube, &exp),
        vec![
            all_times,
            cube.y1997,
            cube.q1_1997,
            cube.q2_1997,
            cube.y1998,
            cube.q1_1998,
        ]
    );
}

#[test]
fn empty_operands_in_arithmetic() {
    let cube = cube();
    let empty = cube.member(cube.profit);

    let plus = cube.infix(empty.clone(), "+", Exp::integer(1));
    assert_eq!(eval(&cube, &plus), Value::Double(1.0));

    let both = cube.infix(empty.clone(), "+", empty.clone());
    assert_eq!(eval(&cube, &both), Value::Null);

    let times = cube.infix(empty, "*", Exp::integer(3));
    assert_eq!(eval(&cube, &times), Value::Null);

    let by_zero = cube.infix(cube.member(cube.sales), "/", Exp::integer(0));
    assert_eq!(eval(&cube, &by_zero), Value::Null);

    let ratio = cube.infix(cube.member(cube.cost), "/", cube.member(cube.sales));
    assert_eq!(eval(&cube, &ratio), Value::Double(34.0 / 57.0));

    let negated = cube.call("-", Syntax::Prefix, vec![cube.member(cube.cost)]);
    assert_eq!(eval(&cube, &negated), Value::Double(-34.0));
}

#[test]
fn iif_picks_a_branch_per_evaluation() {
    let cube = cube();
    let condition = cube.infix(cube.member(cube.sales), ">", Exp::integer(40));
    let iif = cube.fun(
        "IIf",
        vec![condition, Exp::string("big"), Exp::string("small")],
    );
    assert_eq!(eval(&cube, &iif), Value::String("big".to_string()));

    let mut ev = cube.evaluator();
    ev.set_context(cube.y1998);
    assert_eq!(
        eval_in(&cube, &mut ev, &iif),
        Value::String("small".to_string())
    );
}

#[test]
fn iif_with_mixed_branches_yields_values() {
    let cube = cube();
    let condition = cube.infix(cube.member(cube.sales), ">", Exp::integer(100));
    let sales = cube.infix(cube.member(cube.sales), "*", Exp::integer(1));
    let iif = cube.fun("IIf", vec![condition, Exp::string("over"), sales]);
    assert_eq!(eval(&cube, &iif), Value::Double(57.0));
}

#[test]
fn iif_with_constant_condition_folds() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let iif = cube.fun(
        "IIf",
        vec![Exp::boolean(false), Exp::integer(1), Exp::integer(2)],
    );
    let calc = CompileCx::new(&compiler).compile(&iif).unwrap();
    assert_eq!(calc.constant(), Some(&CalcValue::Scalar(Value::Integer(2))));
}

#[test]
fn is_empty_and_logical_operators() {
    let cube = cube();
    let empty = cube.fun("IsEmpty", vec![cube.member(cube.profit)]);
    assert_eq!(eval(&cube, &empty), Value::Boolean(true));

    let full = cube.fun("IsEmpty", vec![cube.member(cube.sales)]);
    assert_eq!(eval(&cube, &full), Value::Boolean(false));

    let both = cube.infix(empty.clone(), "AND", full.clone());
    assert_eq!(eval(&cube, &both), Value::Boolean(false));
    let either = cube.infix(empty, "OR", full.clone());
    assert_eq!(eval(&cube, &either), Value::Boolean(true));
    let not = cube.call("NOT", Syntax::Prefix, vec![full]);
    assert_eq!(eval(&cube, &not), Value::Boolean(true));
}

#[test]
fn comparisons_treat_empty_as_zero_or_empty_string() {
    let cube = cube();
    let empty = cube.member(cube.profit);
    let zero = cube.infix(empty.clone(), "=", Exp::integer(0));
    assert_eq!(eval(&cube, &zero), Value::Boolean(true));

    let text = cube.infix(Exp::string("b"), ">", Exp::string("a"));
    assert_eq!(eval(&cube, &text), Value::Boolean(true));
    let ne = cube.infix(Exp::string("a"), "<>", Exp::string("a"));
    assert_eq!(eval(&cube, &ne), Value::Boolean(false));
}

#[test]
fn lookup_failures() {
    let cube = cube();
    let table = FunTable::standard();
    assert!(!table.is_empty());

    let err = table
        .call(&cube.schema, "Median", Syntax::Function, vec![])
        .unwrap_err();
    assert_eq!(err, CompileError::UnknownFunction("Median".to_string()));

    let err = table
        .call(&cube.schema, "Count", Syntax::Function, vec![])
        .unwrap_err();
    assert!(matches!(err, CompileError::Arity { actual: 0, .. }), "{err:?}");

    let filter = table.lookup("filter", Syntax::Function).unwrap();
    assert_eq!(filter.name(), "Filter");
    assert!(table.lookup("Filter", Syntax::Property).is_none());
}
