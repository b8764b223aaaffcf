use std::time::Duration;

use super::*;
use crate::ast::parse_program;
use crate::rt::ExecContext;
use crate::vm::Compiler;

#[test]
fn test_host_globals_are_visible() {
    let options = options().with_global("answer", Val::Int(41));
    assert_eq!(run_with("answer + 1", options).unwrap(), Val::Int(42));
}

#[test]
fn test_get_and_global_names() {
    let mut vm = vm_for("x := 1\ny := x + 1", options()).unwrap();
    vm.run().unwrap();
    assert_eq!(vm.get("y"), Some(Val::Int(2)));
    assert_eq!(vm.get("missing"), None);
    let names = vm.global_names();
    assert!(names.iter().any(|n| n.as_ref() == "x"));
    assert!(names.iter().any(|n| n.as_ref() == "len"));
}

#[test]
fn test_call_script_function_from_host() {
    let mut vm = vm_for("func add(a, b=10) { a + b }", options()).unwrap();
    vm.run().unwrap();
    let add = vm.get("add").unwrap();
    assert_eq!(vm.call(&add, &[Val::Int(1), Val::Int(2)]).unwrap(), Val::Int(3));
    assert_eq!(vm.call(&add, &[Val::Int(1)]).unwrap(), Val::Int(11));
    let err = vm.call(&add, &[]).unwrap_err();
    assert_eq!(VmError::kind_of(&err), ErrorKind::Args);
}

#[test]
fn test_call_closure_from_host_keeps_state() {
    let mut vm = vm_for(
        "func make() { n := 0\n return func() { n++\n n } }\ncounter := make()",
        options(),
    )
    .unwrap();
    vm.run().unwrap();
    let counter = vm.get("counter").unwrap();
    vm.call(&counter, &[]).unwrap();
    assert_eq!(vm.call(&counter, &[]).unwrap(), Val::Int(2));
}

#[test]
fn test_clone_shares_globals() {
    let mut vm = vm_for("count := 0\nfunc bump() { count = count + 1\n count }", options()).unwrap();
    vm.run().unwrap();
    let bump = vm.get("bump").unwrap();
    let mut clone = vm.clone_vm();
    clone.call(&bump, &[]).unwrap();
    vm.call(&bump, &[]).unwrap();
    assert_eq!(vm.get("count"), Some(Val::Int(2)));
    assert_eq!(clone.get("count"), Some(Val::Int(2)));
}

#[test]
fn test_clones_run_in_parallel_threads() {
    let mut vm = vm_for("func square(x) { x * x }", options()).unwrap();
    vm.run().unwrap();
    let square = vm.get("square").unwrap();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let mut clone = vm.clone_vm();
            let f = square.clone();
            std::thread::spawn(move || clone.call(&f, &[Val::Int(i)]).unwrap())
        })
        .collect();
    let results: Vec<Val> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results, vec![Val::Int(0), Val::Int(1), Val::Int(4), Val::Int(9)]);
}

#[test]
fn test_run_more_continues_with_existing_globals() {
    let options = options();
    let mut compiler = Compiler::new(options.global_names());
    let first = compiler.compile(&parse_program("x := 20").unwrap()).unwrap();
    let mut vm = VirtualMachine::new(first, options);
    vm.run().unwrap();

    let second = compiler
        .compile(&parse_program("y := x + 1\nx + y").unwrap())
        .unwrap();
    vm.run_more(second).unwrap();
    assert_eq!(vm.tos(), Some(Val::Int(41)));
    assert_eq!(vm.get("y"), Some(Val::Int(21)));
}

#[test]
fn test_run_more_rejects_unrelated_code() {
    let mut vm = vm_for("x := 1", options()).unwrap();
    vm.run().unwrap();
    let other = compile_source("y := 2\nz := 3", "other", &options().global_names()).unwrap();
    assert!(vm.run_more(other).is_err());
}

#[test]
fn test_stack_limit() {
    let limits = Limits {
        max_stack: 8,
        initial_stack: 2,
        ..Limits::default()
    };
    let e = run_with("[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]", options().with_limits(limits)).unwrap_err();
    let e = VmError::from_anyhow(&e);
    assert_eq!(e.kind, ErrorKind::Resource);
    assert!(e.message.contains("stack overflow"), "{}", e.message);
}

#[test]
fn test_argument_limit() {
    let limits = Limits {
        max_args: 2,
        ..Limits::default()
    };
    let e = run_with("f := func(a, b, c) { a }\nf(1, 2, 3)", options().with_limits(limits)).unwrap_err();
    assert_eq!(VmError::kind_of(&e), ErrorKind::Resource);
}

#[test]
fn test_limits_from_config() {
    let limits = Limits::from_toml_str("max_frames = 32\nmax_stack = 128").unwrap();
    assert_eq!(limits.max_frames, 32);
    assert_eq!(limits.max_stack, 128);
    assert_eq!(limits.max_args, Limits::default().max_args);
    assert!(Limits::from_json_str("{\"max_stack\": 0}").is_err());
}

#[test]
fn test_cancellation_stops_a_running_loop() {
    let context = ExecContext::new();
    let mut vm = vm_for("for { }", options().with_context(context.clone())).unwrap();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        context.cancel();
    });
    let err = vm.run().unwrap_err();
    canceller.join().unwrap();
    assert_eq!(VmError::kind_of(&err), ErrorKind::Cancelled);
}

#[test]
fn test_cancellation_skips_deferred_calls() {
    let context = ExecContext::new();
    let src = "
log := []
func spin() {
  defer log.append(\"deferred\")
  for { }
}
spin()
";
    let mut vm = vm_for(src, options().with_context(context.clone())).unwrap();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        context.cancel();
    });
    assert!(vm.run().is_err());
    canceller.join().unwrap();
    assert_eq!(vm.get("log"), Some(Val::list(Vec::new())));
}

#[test]
fn test_timeout_context() {
    let context = ExecContext::with_timeout(Duration::from_millis(30)).unwrap();
    let err = run_with("n := 0\nfor { n++ }", options().with_context(context)).unwrap_err();
    assert_eq!(VmError::kind_of(&err), ErrorKind::Cancelled);
}

#[test]
fn test_disassemble_main_code() {
    let vm = vm_for("func f() { 1 }", options()).unwrap();
    let text = vm.main_code().disassemble();
    assert!(text.contains("== main =="));
    assert!(text.contains("== f =="));
}
