use super::*;

#[test]
fn test_recursive_factorial() {
    let src = "
func fact(n) {
  if n <= 1 { return 1 }
  return n * fact(n - 1)
}
fact(10)
";
    assert_eq!(run(src), Val::Int(3628800));
}

#[test]
fn test_body_value_is_implicit_return() {
    assert_eq!(run("f := func(a, b) { a * b }\nf(6, 7)"), Val::Int(42));
    assert_eq!(run("f := func() { x := 1 }\nf()"), Val::Nil);
}

#[test]
fn test_default_parameters() {
    let src = "
func greet(name, greeting=\"hi\", times=1) { [greeting, name, times] }
[greet(\"a\"), greet(\"b\", \"yo\"), greet(\"c\", \"hey\", 3)]
";
    let out = run(src);
    let expect = Val::list(vec![
        Val::list(vec![Val::from("hi"), Val::from("a"), Val::Int(1)]),
        Val::list(vec![Val::from("yo"), Val::from("b"), Val::Int(1)]),
        Val::list(vec![Val::from("hey"), Val::from("c"), Val::Int(3)]),
    ]);
    assert_eq!(out, expect);
}

#[test]
fn test_container_defaults_are_fresh_per_call() {
    let src = "
func add(x, acc=[]) { acc.append(x) }
add(1)
add(2)
";
    assert_eq!(run(src), ints(&[2]));
}

#[test]
fn test_arity_errors() {
    let e = run_err("func f(a, b) { a }\nf(1)");
    assert_eq!(e.kind, ErrorKind::Args);
    assert_eq!(e.message, "function \"f\" takes 2 arguments (1 given)");
    let e = run_err("func g(a, b=1) { a }\ng(1, 2, 3)");
    assert_eq!(e.message, "function \"g\" takes 1 to 2 arguments (3 given)");
    let e = run_err("h := func() { 1 }\nh(1)");
    assert_eq!(e.message, "function \"<anonymous>\" takes 0 arguments (1 given)");
}

#[test]
fn test_closure_shares_captured_variable() {
    let src = "
x := 0
func counter() {
  n := 0
  return func() { n++\n n }
}
c := counter()
c()
c()
c()
";
    assert_eq!(run(src), Val::Int(3));
}

#[test]
fn test_closures_alias_the_same_cell() {
    let src = "
func pair() {
  n := 0
  inc := func() { n = n + 1 }
  get := func() { n }
  return [inc, get]
}
fs := pair()
fs[0]()
fs[0]()
fs[1]()
";
    assert_eq!(run(src), Val::Int(2));
}

#[test]
fn test_capture_through_two_levels() {
    let src = "
func outer() {
  v := 10
  return func() {
    return func() { v = v + 1\n v }
  }
}
f := outer()()
f()
f()
";
    assert_eq!(run(src), Val::Int(12));
}

#[test]
fn test_closure_updates_after_capture_are_visible() {
    let src = "
func f() {
  n := 1
  get := func() { n }
  n = 5
  return get()
}
f()
";
    assert_eq!(run(src), Val::Int(5));
}

#[test]
fn test_globals_updated_from_function() {
    assert_eq!(run("x := 0\nf := func(n) { x = x + n }\nf(2)\nf(3)\nx"), Val::Int(5));
}

#[test]
fn test_native_calls_back_into_script() {
    let src = "
double := func(x) { x * 2 }
apply(double, 21)
";
    assert_eq!(run(src), Val::Int(42));
    assert_eq!(run("apply(func(a, b) { a - b }, 10, 4)"), Val::Int(6));
}

#[test]
fn test_bound_methods_are_values() {
    assert_eq!(run("xs := [1]\npush := xs.append\npush(2)\nlen(xs)"), Val::Int(2));
}

#[test]
fn test_defer_runs_in_reverse_order_after_return() {
    let src = "
log := []
func work() {
  defer log.append(\"first\")
  defer log.append(\"second\")
  log.append(\"body\")
  return len(log)
}
n := work()
[n, log]
";
    let out = run(src);
    let expect = Val::list(vec![
        Val::Int(1),
        Val::list(vec![Val::from("body"), Val::from("second"), Val::from("first")]),
    ]);
    assert_eq!(out, expect);
}

#[test]
fn test_defer_arguments_are_evaluated_immediately() {
    let src = "
log := []
func f() {
  x := 1
  defer log.append(x)
  x = 2
}
f()
log
";
    assert_eq!(run(src), ints(&[1]));
}

#[test]
fn test_defer_runs_when_function_fails() {
    let options = options();
    let mut vm = vm_for(
        "
log := []
func f() {
  defer log.append(\"cleanup\")
  x := 1 + nil
}
f()
",
        options,
    )
    .unwrap();
    let err = vm.run().unwrap_err();
    assert_eq!(VmError::kind_of(&err), ErrorKind::Type);
    let log = vm.get("log").unwrap();
    assert_eq!(log, Val::list(vec![Val::from("cleanup")]));
}

#[test]
fn test_top_level_defer_runs_at_halt() {
    let mut vm = vm_for("log := []\ndefer log.append(1)\nlog.append(0)\n7", options()).unwrap();
    vm.run().unwrap();
    assert_eq!(vm.tos(), Some(Val::Int(7)));
    assert_eq!(vm.get("log"), Some(ints(&[0, 1])));
}

#[test]
fn test_deep_recursion_hits_frame_limit() {
    let limits = Limits {
        max_frames: 64,
        ..Limits::default()
    };
    let e = run_with("func f(n) { f(n + 1) }\nf(0)", options().with_limits(limits)).unwrap_err();
    let e = VmError::from_anyhow(&e);
    assert_eq!(e.kind, ErrorKind::Resource);
    assert!(e.message.contains("maximum call depth"), "{}", e.message);
}

#[test]
fn test_native_callbacks_hit_nesting_limit() {
    let src = "
func f(n) {
  if n == 0 { return 0 }
  return apply(func(x) { f(x) }, n - 1)
}
";
    let mut vm = vm_for(&format!("{src}f(500)"), options()).unwrap();
    let e = VmError::from_anyhow(&vm.run().unwrap_err());
    assert_eq!(e.kind, ErrorKind::Resource);
    assert!(e.message.contains("maximum nested call depth"), "{}", e.message);
    // the VM is left clean for the next run
    let f = vm.get("f").unwrap();
    assert_eq!(vm.call(&f, &[Val::Int(10)]).unwrap(), Val::Int(0));

    let limits = Limits {
        max_nesting: 8,
        ..Limits::default()
    };
    assert_eq!(
        run_with(&format!("{src}f(3)"), options().with_limits(limits)).unwrap(),
        Val::Int(0)
    );
    let e = run_with(&format!("{src}f(20)"), options().with_limits(limits)).unwrap_err();
    assert_eq!(VmError::kind_of(&e), ErrorKind::Resource);
}

#[test]
fn test_vm_usable_after_runtime_error() {
    let mut vm = vm_for("func f() { 1 + nil }\nf()", options()).unwrap();
    assert!(vm.run().is_err());
    assert!(vm.run().is_err());
    let f = vm.get("f").unwrap();
    assert!(f.is_callable());
}
