mod common;

use common::cube;
use olap_calc::bridge::{double_to_integer, value_to_double, value_to_integer};
use olap_calc::{Calc, CompileCx, EvalError, Exp};
use olap_model::Value;
use proptest::prelude::*;

const I32_BOUND: f64 = 2_147_483_648.0;

proptest! {
    #[test]
    fn in_range_doubles_truncate_toward_zero(x in -2_147_483_647.9f64..2_147_483_647.9) {
        prop_assert_eq!(double_to_integer(x).unwrap(), x.trunc() as i32);
    }

    #[test]
    fn out_of_range_doubles_overflow(x in I32_BOUND..1e18, negative in any::<bool>()) {
        let x = if negative { -x - 1.0 } else { x };
        prop_assert_eq!(double_to_integer(x), Err(EvalError::IntegerOverflow(x)));
    }

    #[test]
    fn formatted_numbers_convert_back(x in -1e12f64..1e12) {
        let text = Value::String(format!("{x}"));
        prop_assert_eq!(value_to_double(&text).unwrap(), Some(x));
    }

    #[test]
    fn integers_pass_through_unchanged(i in any::<i32>()) {
        prop_assert_eq!(value_to_integer(&Value::Integer(i)).unwrap(), Some(i));
        prop_assert_eq!(value_to_integer(&Value::Double(f64::from(i))).unwrap(), Some(i));
    }

    #[test]
    fn double_literals_fold_to_truncated_integers(x in -1e9f64..1e9) {
        let cube = cube();
        let compiler = cube.base_compiler();
        let cx = CompileCx::new(&compiler);
        let mut ev = cube.evaluator();

        let calc = cx.compile_integer(&Exp::double(x)).unwrap();
        prop_assert_eq!(calc.evaluate_integer(&mut ev).unwrap(), Some(x.trunc() as i32));
        prop_assert!(Calc::Integer(calc).is_constant());
    }

    #[test]
    fn integer_sums_fold_like_doubles(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
        let cube = cube();
        let compiler = cube.base_compiler();
        let cx = CompileCx::new(&compiler);
        let mut ev = cube.evaluator();

        let sum = cube.infix(Exp::integer(a), "+", Exp::integer(b));
        let calc = cx.compile_double(&sum).unwrap();
        prop_assert_eq!(calc.evaluate_double(&mut ev).unwrap(), Some((a + b) as f64));
    }
}
