use super::Calc;
use std::fmt::Write;

pub(super) fn explain(calc: &Calc) -> String {
    let mut out = String::new();
    write_node(&mut out, calc, 0);
    out
}

fn write_node(out: &mut String, calc: &Calc, depth: usize) {
    for _ in 0..depth {
        out.push_str("    ");
    }
    let _ = write!(
        out,
        "{}(type={}, resultStyle={}",
        calc.name(),
        calc.result_type(),
        calc.result_style()
    );
    for (key, value) in calc.annotations() {
        let _ = write!(out, ", {key}={value}");
    }
    out.push_str(")\n");
    for child in calc.children() {
        write_node(out, &child, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use crate::calc::{Calc, CalcValue};
    use crate::types::Type;
    use olap_model::Value;

    #[test]
    fn renders_one_line_per_node() {
        let calc = Calc::constant_of(CalcValue::Scalar(Value::Double(1.5)), Type::NUMERIC);
        assert_eq!(
            calc.explain(),
            "Constant(type=NUMERIC, resultStyle=VALUE, value=1.5)\n"
        );
    }
}
