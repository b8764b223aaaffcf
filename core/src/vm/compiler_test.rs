#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::error::{ErrorKind, VmError};
    use crate::op::{BinaryOpType, CompareOpType};
    use crate::vm::{Code, Compiler, Constant, Op, compile_source};

    fn compile(src: &str) -> Arc<Code> {
        compile_source(src, "main", &[]).unwrap()
    }

    fn compile_with(src: &str, globals: &[&str]) -> Arc<Code> {
        let names: Vec<Arc<str>> = globals.iter().map(|g| Arc::from(*g)).collect();
        compile_source(src, "main", &names).unwrap()
    }

    fn compile_error(src: &str) -> VmError {
        let err = compile_source(src, "main", &[]).unwrap_err();
        assert_eq!(VmError::kind_of(&err), ErrorKind::Compile, "{err}");
        VmError::from_anyhow(&err)
    }

    fn function(code: &Code, idx: usize) -> Arc<crate::vm::FunctionTemplate> {
        match &code.constants[idx] {
            Constant::Function(f) => f.clone(),
            other => panic!("expected function constant, got {other:?}"),
        }
    }

    #[test]
    fn test_declare_and_load_global() {
        let code = compile("x := 1\nx + 2");
        assert_eq!(code.global_names, vec![Arc::<str>::from("x")]);
        assert_eq!(
            code.instructions,
            vec![
                Op::LoadConst(0),
                Op::StoreGlobal(0),
                Op::LoadGlobal(0),
                Op::LoadConst(1),
                Op::BinaryOp(BinaryOpType::Add),
                Op::Halt,
            ]
        );
        assert_eq!(code.constants, vec![Constant::Int(1), Constant::Int(2)]);
    }

    #[test]
    fn test_host_globals_come_first_sorted() {
        let code = compile_with("y := len\ny", &["print", "len"]);
        let names: Vec<&str> = code.global_names.iter().map(|n| n.as_ref()).collect();
        assert_eq!(names, vec!["len", "print", "y"]);
        assert_eq!(code.instructions[0], Op::LoadGlobal(0));
        assert_eq!(code.instructions[1], Op::StoreGlobal(2));
    }

    #[test]
    fn test_trailing_statement_leaves_nil() {
        let code = compile("x := 1");
        assert_eq!(code.instructions[code.len() - 2..], [Op::Nil, Op::Halt]);
    }

    #[test]
    fn test_constants_are_deduplicated() {
        let code = compile("a := 7\nb := 7\nc := \"s\"\nd := \"s\"");
        assert_eq!(code.constants, vec![Constant::Int(7), Constant::Str(Arc::from("s"))]);
    }

    #[test]
    fn test_and_short_circuits() {
        let code = compile("a := true\nb := false\na && b");
        let tail = &code.instructions[4..];
        assert_eq!(
            tail,
            [
                Op::LoadGlobal(0),
                Op::Copy(0),
                Op::PopJumpForwardIfFalse(2),
                Op::LoadGlobal(1),
                Op::BinaryOp(BinaryOpType::And),
                Op::Halt,
            ]
        );
    }

    #[test]
    fn test_in_operator_puts_container_on_top() {
        let code = compile("xs := [1]\n1 not in xs");
        let tail = &code.instructions[code.len() - 4..];
        assert_eq!(
            tail,
            [Op::LoadConst(0), Op::LoadGlobal(0), Op::ContainsOp(true), Op::Halt]
        );
    }

    #[test]
    fn test_comparison_emits_compare_op() {
        let code = compile("1 <= 2");
        assert!(code.instructions.contains(&Op::CompareOp(CompareOpType::Le)));
    }

    #[test]
    fn test_closure_captures_local_as_cell() {
        let code = compile("func outer() {\n  n := 1\n  return func() { return n }\n}\nouter");
        let outer = function(&code, 0);
        assert!(outer.code.instructions.contains(&Op::MakeCell(0)));
        assert!(
            outer
                .code
                .instructions
                .iter()
                .any(|op| matches!(op, Op::LoadClosure { free: 1, .. }))
        );
        let inner = match outer.code.constants.iter().find_map(|c| match c {
            Constant::Function(f) => Some(f.clone()),
            _ => None,
        }) {
            Some(f) => f,
            None => panic!("inner function missing"),
        };
        assert_eq!(inner.free_count, 1);
        assert!(inner.code.instructions.contains(&Op::LoadFree(0)));
    }

    #[test]
    fn test_named_function_keeps_itself_after_params() {
        let code = compile("func fact(n) { if n <= 1 { return 1 }\n return n * fact(n - 1) }");
        let fact = function(&code, 0);
        assert!(fact.code.is_named);
        assert_eq!(fact.params.len(), 1);
        assert!(fact.code.instructions.contains(&Op::LoadFast(1)));
        assert!(fact.code.locals_count >= 2);
    }

    #[test]
    fn test_function_without_captures_is_a_constant() {
        let code = compile("f := func(a, b=2) { a + b }");
        assert_eq!(code.instructions[0], Op::LoadConst(0));
        let f = function(&code, 0);
        assert_eq!(f.defaults, vec![None, Some(Constant::Int(2))]);
        assert_eq!(f.required_args(), 1);
        assert_eq!(f.code.instructions.last(), Some(&Op::ReturnValue));
    }

    #[test]
    fn test_range_loop_stores_key_then_value() {
        let code = compile("for k, v := range [1, 2] { k + v }");
        let ops = &code.instructions;
        let at = ops
            .iter()
            .position(|op| matches!(op, Op::ForIter { names: 2, .. }))
            .unwrap();
        assert_eq!(ops[at - 1], Op::GetIter);
        assert_eq!(ops[at + 1], Op::StoreFast(0));
        assert_eq!(ops[at + 2], Op::StoreFast(1));
        assert!(ops.contains(&Op::PopTop));
    }

    #[test]
    fn test_go_and_defer_bind_a_partial() {
        let code = compile("func f(x) { x }\nfunc g() { defer f(1)\n go f(2) }");
        let g = function(&code, 1);
        let ops = &g.code.instructions;
        let defer = ops.iter().position(|op| *op == Op::Defer).unwrap();
        assert_eq!(ops[defer - 1], Op::Partial(1));
        let go = ops.iter().position(|op| *op == Op::Go).unwrap();
        assert_eq!(ops[go - 1], Op::Partial(1));
    }

    #[test]
    fn test_import_binds_last_segment() {
        let code = compile("import util.strings\nstrings");
        assert_eq!(code.global_names, vec![Arc::<str>::from("strings")]);
        assert_eq!(code.constants[0], Constant::Str(Arc::from("util/strings")));
        assert_eq!(code.instructions[..2], [Op::Import(0), Op::StoreGlobal(0)]);
    }

    #[test]
    fn test_from_import_loads_each_name() {
        let code = compile("from m import a, b as c\nc");
        let names: Vec<&str> = code.global_names.iter().map(|n| n.as_ref()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert!(matches!(code.instructions[0], Op::FromImport { path: 0, name: 0 }));
        assert!(matches!(code.instructions[2], Op::FromImport { path: 0, name: 1 }));
    }

    #[test]
    fn test_switch_uses_equality() {
        let code = compile("x := 2\nswitch x { case 1: \"one\"\n case 2: \"two\"\n default: \"many\" }");
        assert!(code.instructions.contains(&Op::CompareOp(CompareOpType::Eq)));
    }

    #[test]
    fn test_disassembly_names_globals() {
        let code = compile("answer := 42");
        let text = code.disassemble();
        assert!(text.starts_with("== main =="), "{text}");
        assert!(text.contains("StoreGlobal(0)  ; answer"), "{text}");
    }

    #[test]
    fn test_undefined_variable() {
        let e = compile_error("x + 1");
        assert_eq!(e.message, "undefined variable \"x\"");
        assert_eq!(e.position.map(|p| p.line), Some(1));
    }

    #[test]
    fn test_const_rules() {
        assert_eq!(
            compile_error("const x = 1\nx = 2").message,
            "cannot assign to constant \"x\""
        );
        assert_eq!(
            compile_error("const x = 1\nx := 2").message,
            "cannot redeclare constant \"x\""
        );
    }

    #[test]
    fn test_control_flow_outside_its_context() {
        assert!(compile_error("return 1").message.contains("return"));
        assert!(compile_error("break").message.contains("break"));
        assert!(compile_error("continue").message.contains("continue"));
    }

    #[test]
    fn test_default_parameter_rules() {
        assert!(
            compile_error("f := func(a=1, b) { a }")
                .message
                .contains("without a default")
        );
        assert!(
            compile_error("y := 1\nf := func(a=y) { a }")
                .message
                .contains("unsupported default value")
        );
    }

    #[test]
    fn test_multiple_defaults_in_switch() {
        assert!(
            compile_error("switch 1 { default: 1\n default: 2 }")
                .message
                .contains("default")
        );
    }

    #[test]
    fn test_parse_error_is_compile_error() {
        let e = compile_error("x := (1");
        assert!(!e.message.is_empty());
    }

    #[test]
    fn test_incremental_compile_extends_main() {
        let mut compiler = Compiler::new(Vec::<Arc<str>>::new());
        let first = compiler
            .compile(&crate::ast::parse_program("x := 1").unwrap())
            .unwrap();
        let second = compiler
            .compile(&crate::ast::parse_program("x + 1").unwrap())
            .unwrap();
        assert_eq!(second.instructions[..first.len()], first.instructions[..]);
        assert_eq!(second.instructions.last(), Some(&Op::Halt));
        assert_eq!(compiler.global_names(), &[Arc::<str>::from("x")]);
    }

    #[test]
    fn test_failed_compile_leaves_compiler_untouched() {
        let mut compiler = Compiler::new(Vec::<Arc<str>>::new());
        let first = compiler
            .compile(&crate::ast::parse_program("x := 1").unwrap())
            .unwrap();
        assert!(
            compiler
                .compile(&crate::ast::parse_program("y := 2\nnope").unwrap())
                .is_err()
        );
        assert_eq!(compiler.global_names(), &[Arc::<str>::from("x")]);
        let next = compiler
            .compile(&crate::ast::parse_program("x").unwrap())
            .unwrap();
        assert_eq!(next.instructions[..first.len()], first.instructions[..]);
        assert_eq!(next.len(), first.len() + 2);
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let src = "func f(a, b = 2) {\n  return func() { a + b }\n}\nm := {\"k\": f(1)()}\nfor k, v := range m { m[k] = v * 2 }\nm";
        let program = crate::ast::parse_program(src).unwrap();
        let names = vec![Arc::<str>::from("len")];
        let a = crate::vm::compile(&program, &names).unwrap();
        let b = crate::vm::compile(&program, &names).unwrap();
        assert_eq!(a.instructions, b.instructions);
        assert_eq!(a.disassemble(), b.disassemble());
    }
}
