mod common;

use common::cube;
use olap_calc::{
    build_compiler, Calc, CalcValue, CompileCx, CompileError, CompileResult, CompilerFlavor,
    CompilerSettings, DecoratingCompiler, Exp, ProfilingHook, RefinedCompiler, TracingHook, Type,
};
use olap_model::Value;
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

fn recorder(
    layer: &'static str,
    log: Log,
    schema: std::sync::Arc<olap_model::Schema>,
) -> impl Fn(&Exp, Calc, bool) -> CompileResult<Calc> {
    move |exp: &Exp, calc: Calc, _mutable: bool| {
        log.borrow_mut()
            .push(format!("{layer} {}", exp.display(&schema)));
        Ok(calc)
    }
}

#[test]
fn stacked_hooks_run_innermost_first_on_every_node() {
    let cube = cube();
    let log: Log = Rc::default();
    let inner = DecoratingCompiler::new(
        cube.base_compiler(),
        recorder("inner", log.clone(), cube.schema.clone()),
    );
    let outer = DecoratingCompiler::new(inner, recorder("outer", log.clone(), cube.schema.clone()));
    let cx = CompileCx::new(&outer);

    let sum = cube.fun("Sum", vec![cube.members(cube.year)]);
    cx.compile(&sum).unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            "inner [Time].[Year]".to_string(),
            "outer [Time].[Year]".to_string(),
            "inner [Time].[Year].Members".to_string(),
            "outer [Time].[Year].Members".to_string(),
            "inner Sum([Time].[Year].Members)".to_string(),
            "outer Sum([Time].[Year].Members)".to_string(),
        ]
    );
}

#[test]
fn hooks_see_child_expressions_compiled_by_the_refined_policy() {
    let cube = cube();
    let log: Log = Rc::default();
    let compiler = DecoratingCompiler::new(
        RefinedCompiler::new(cube.base_compiler()),
        recorder("hook", log.clone(), cube.schema.clone()),
    );
    let cx = CompileCx::new(&compiler);

    let exp = cube.infix(cube.member(cube.sales), "*", Exp::integer(2));
    cx.compile(&exp).unwrap();

    let log = log.borrow();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0], "hook [Measures].[Sales]");
    assert_eq!(log[1], "hook 2");
    assert_eq!(log[2], "hook ([Measures].[Sales] * 2)");
}

#[test]
fn hook_must_preserve_the_calc_kind() {
    let cube = cube();
    let compiler = DecoratingCompiler::new(
        cube.base_compiler(),
        |_exp: &Exp, _calc: Calc, _mutable: bool| -> CompileResult<Calc> {
            Ok(Calc::constant_of(
                CalcValue::Scalar(Value::String("replaced".to_string())),
                Type::STRING,
            ))
        },
    );
    let cx = CompileCx::new(&compiler);

    let err = cx.compile(&Exp::integer(1)).unwrap_err();
    assert!(matches!(err, CompileError::Internal(_)), "{err:?}");

    let replaced = cx.compile(&Exp::string("original")).unwrap();
    assert_eq!(
        replaced.constant(),
        Some(&CalcValue::Scalar(Value::String("replaced".to_string())))
    );
}

#[test]
fn tracing_leaves_the_tree_unchanged() {
    let cube = cube();
    let plain = cube.base_compiler();
    let traced = DecoratingCompiler::new(cube.base_compiler(), TracingHook::new(cube.schema.clone()));

    let exp = cube.fun(
        "Filter",
        vec![
            cube.members(cube.quarter),
            cube.infix(cube.member(cube.sales), ">", Exp::integer(10)),
        ],
    );
    let a = CompileCx::new(&plain).compile(&exp).unwrap();
    let b = CompileCx::new(&traced).compile(&exp).unwrap();
    assert_eq!(a.explain(), b.explain());
}

#[test]
fn profiling_counts_evaluations_per_node() {
    let cube = cube();
    let hook = ProfilingHook::new(cube.schema.clone());
    let profile = hook.profile().clone();
    let compiler = DecoratingCompiler::new(cube.base_compiler(), hook);
    let cx = CompileCx::new(&compiler);
    let mut ev = cube.evaluator();

    let exp = cube.infix(cube.member(cube.sales), "-", cube.member(cube.cost));
    let calc = cx.compile(&exp).unwrap();
    assert_eq!(calc.evaluate_scalar(&mut ev).unwrap(), Value::Double(23.0));
    assert_eq!(calc.evaluate_scalar(&mut ev).unwrap(), Value::Double(23.0));

    let entries = profile.entries();
    let root = entries.last().unwrap();
    assert_eq!(root.calc_name(), "Arithmetic");
    assert_eq!(root.evaluations(), 2);
    assert!(calc.explain().contains("evaluations=2"), "{}", calc.explain());
    assert!(profile.report().contains("Arithmetic"));
}

#[test]
fn built_stack_with_profiling_exposes_its_profile() {
    let cube = cube();
    let settings = CompilerSettings {
        flavor: CompilerFlavor::Refined,
        trace_compilation: true,
        profiling: true,
    };
    let ev = cube.evaluator();
    let stack = build_compiler(&settings, cube.schema.clone(), &ev);

    let count = cube.fun("Count", vec![cube.members(cube.quarter)]);
    stack.cx().compile(&count).unwrap();
    let profile = stack.profile().unwrap();
    assert!(profile
        .entries()
        .iter()
        .any(|entry| entry.expression() == "Count([Time].[Quarter].Members)"));
}
