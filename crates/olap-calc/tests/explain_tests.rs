mod common;

use common::cube;
use olap_calc::{Calc, CompileCx, Exp};
use pretty_assertions::assert_eq;

fn lines(calc: &Calc) -> Vec<String> {
    calc.explain().lines().map(str::to_string).collect()
}

#[test]
fn measure_read_as_double_shows_each_bridge() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);

    let calc = Calc::Double(cx.compile_double(&cube.member(cube.sales)).unwrap());
    let lines = lines(&calc);
    assert_eq!(lines.len(), 3, "{lines:#?}");
    assert_eq!(lines[0], "ValueToDouble(type=NUMERIC, resultStyle=VALUE)");
    assert!(lines[1].starts_with("    MemberValue("), "{}", lines[1]);
    assert!(lines[1].ends_with(", null_check=false)"), "{}", lines[1]);
    assert!(lines[2].starts_with("        Constant(type=MEMBER"), "{}", lines[2]);
}

#[test]
fn every_node_gets_one_indented_line() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);

    let exp = cube.fun(
        "Sum",
        vec![
            cube.fun(
                "Filter",
                vec![
                    cube.members(cube.quarter),
                    cube.infix(cube.member(cube.sales), ">", Exp::integer(10)),
                ],
            ),
            cube.member(cube.cost),
        ],
    );
    let calc = cx.compile(&exp).unwrap();
    let text = calc.explain();

    fn count(calc: &Calc) -> usize {
        1 + calc.children().iter().map(count).sum::<usize>()
    }
    assert_eq!(text.lines().count(), count(&calc));
    assert!(text.ends_with(")\n"));
    for line in text.lines() {
        let indent = line.len() - line.trim_start().len();
        assert_eq!(indent % 4, 0, "{line}");
        assert!(line.contains("(type="), "{line}");
        assert!(line.contains(", resultStyle="), "{line}");
    }
    assert!(text.starts_with("Sum("), "{text}");
}

#[test]
fn set_results_report_their_style() {
    let cube = cube();
    let compiler = cube.base_compiler();
    let cx = CompileCx::new(&compiler);

    let list = Calc::List(cx.compile_list(&cube.members(cube.year), false).unwrap());
    assert!(list.explain().contains("resultStyle=LIST"), "{}", list.explain());

    let owned = Calc::List(cx.compile_list(&cube.members(cube.year), true).unwrap());
    let first = owned.explain().lines().next().unwrap().to_string();
    assert!(first.starts_with("CopyOnWriteList("), "{first}");
    assert!(first.contains("resultStyle=MUTABLE_LIST"), "{first}");
}
