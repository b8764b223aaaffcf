use super::*;

#[test]
fn test_arithmetic_and_precedence() {
    assert_eq!(run("1 + 2 * 3"), Val::Int(7));
    assert_eq!(run("(1 + 2) * 3"), Val::Int(9));
    assert_eq!(run("7 % 3"), Val::Int(1));
    assert_eq!(run("2 ** 10"), Val::Int(1024));
    assert_eq!(run("1.5 + 1"), Val::Float(2.5));
    assert_eq!(run("-3 + 1"), Val::Int(-2));
}

#[test]
fn test_strings() {
    assert_eq!(run("\"a\" + \"b\""), Val::from("ab"));
    assert_eq!(run("s := \"hello\"\ns[1]"), Val::from("e"));
    assert_eq!(run("s := \"hello\"\ns[1:3]"), Val::from("el"));
    assert_eq!(run("name := \"brook\"\n`hi {name}!`"), Val::from("hi brook!"));
    assert_eq!(run("\"ell\" in \"hello\""), Val::Bool(true));
}

#[test]
fn test_comparisons_and_logic() {
    assert_eq!(run("1 < 2 && 2 < 3"), Val::Bool(true));
    assert_eq!(run("1 > 2 || 3 == 3"), Val::Bool(true));
    assert_eq!(run("!true"), Val::Bool(false));
    assert_eq!(run("0 || \"x\""), Val::from("x"));
    assert_eq!(run("nil && 1"), Val::Nil);
}

#[test]
fn test_short_circuit_skips_rhs() {
    let src = "
calls := 0
func bump() { calls = calls + 1\n return true }
false && bump()
true || bump()
calls
";
    assert_eq!(run(src), Val::Int(0));
}

#[test]
fn test_lists_alias_and_mutate() {
    let src = "
a := [1, 2, 3]
b := a
b[0] = 10
a.append(4)
[a[0], len(a), b[3], a[-1]]
";
    assert_eq!(run(src), ints(&[10, 4, 4, 4]));
    assert_eq!(run("[1, 2, 3, 4][1:3]"), ints(&[2, 3]));
    assert_eq!(run("[1, 2, 3][:2]"), ints(&[1, 2]));
    assert_eq!(run("2 in [1, 2]"), Val::Bool(true));
}

#[test]
fn test_maps() {
    let src = "
m := {\"a\": 1, \"b\": 2}
m[\"c\"] = 3
m.d = 4
[m.a, m[\"b\"], len(m), m.d]
";
    assert_eq!(run(src), ints(&[1, 2, 4, 4]));
    assert_eq!(run("m := {\"k\": 1}\n\"k\" in m"), Val::Bool(true));
    assert_eq!(run("m := {\"k\": 1}\nm.keys()"), Val::list(vec![Val::from("k")]));
}

#[test]
fn test_map_keys_must_be_strings() {
    let e = run_err("{1: 2}");
    assert_eq!(e.kind, ErrorKind::Type);
    assert!(e.message.contains("map key must be a string"), "{}", e.message);
}

#[test]
fn test_sets() {
    assert_eq!(run("s := {1, 2, 2, 3}\nlen(s)"), Val::Int(3));
    assert_eq!(run("s := {1, 2}\n2 in s"), Val::Bool(true));
    let e = run_err("{[1]}");
    assert_eq!(e.kind, ErrorKind::Type);
    assert!(e.message.contains("not hashable"), "{}", e.message);
}

#[test]
fn test_compound_assignment() {
    assert_eq!(run("x := 1\nx += 4\nx *= 2\nx -= 1\nx"), Val::Int(9));
    assert_eq!(run("xs := [1, 2]\nxs[1] += 5\nxs"), ints(&[1, 7]));
    assert_eq!(run("m := {\"n\": 1}\nm.n += 1\nm.n"), Val::Int(2));
    assert_eq!(run("i := 0\ni++\ni++\ni--\ni"), Val::Int(1));
}

#[test]
fn test_unpacking() {
    assert_eq!(run("a, b := [1, 2]\n[b, a]"), ints(&[2, 1]));
    assert_eq!(run("a := 1\nb := 2\na, b = [b, a]\n[a, b]"), ints(&[2, 1]));
    let e = run_err("a, b := [1, 2, 3]");
    assert_eq!(e.kind, ErrorKind::Eval);
    assert!(e.message.contains("unpack count mismatch"), "{}", e.message);
    assert_eq!(run_err("a, b := 5").kind, ErrorKind::Type);
}

#[test]
fn test_unpacking_other_containers() {
    assert_eq!(
        run("a, b := \"xy\"\n[a, b]"),
        Val::list(vec![Val::from("x"), Val::from("y")])
    );
    assert_eq!(run("a, b := {2, 1}\n[a, b]"), ints(&[1, 2]));
    assert_eq!(run("m := {\"b\": 2, \"a\": 1}\na, b := m\n[a, b]"), ints(&[1, 2]));

    let e = run_err("a, b := \"xyz\"");
    assert_eq!(e.kind, ErrorKind::Eval);
    assert_eq!(e.message, "unpack count mismatch: expected 2 values, got 3");
    assert_eq!(run_err("a, b := {1}").kind, ErrorKind::Eval);
}

#[test]
fn test_if_and_switch_are_values() {
    assert_eq!(run("x := if 1 < 2 { \"yes\" } else { \"no\" }\nx"), Val::from("yes"));
    assert_eq!(run("if false { 1 }"), Val::Nil);
    let src = "
func name(n) {
  switch n {
  case 1: \"one\"
  case 2, 3: \"few\"
  default: \"many\"
  }
}
[name(1), name(3), name(9)]
";
    assert_eq!(
        run(src),
        Val::list(vec![Val::from("one"), Val::from("few"), Val::from("many")])
    );
    assert_eq!(run("switch 5 { case 1: 2 }"), Val::Nil);
}

#[test]
fn test_ternary() {
    assert_eq!(run("x := 3\nx > 2 ? \"big\" : \"small\""), Val::from("big"));
}

#[test]
fn test_pipe_passes_value_as_first_argument() {
    let src = "
func add(a, b) { a + b }
func double(a) { a * 2 }
3 | add(4) | double
";
    assert_eq!(run(src), Val::Int(14));
}

#[test]
fn test_attribute_errors() {
    let e = run_err("x := 1\nx.nope");
    assert_eq!(e.kind, ErrorKind::Eval);
    assert_eq!(e.message, "attribute \"nope\" not found on int");
    assert_eq!(e.position.map(|p| p.line), Some(2));
}

#[test]
fn test_type_errors_carry_position() {
    let e = run_err("a := 1\n\nb := a + \"s\"");
    assert_eq!(e.kind, ErrorKind::Type);
    assert_eq!(e.position.map(|p| p.line), Some(3));
}

#[test]
fn test_calling_a_non_callable() {
    let e = run_err("x := 3\nx()");
    assert_eq!(e.kind, ErrorKind::Type);
    assert_eq!(e.message, "int object is not callable");
}

#[test]
fn test_native_error_value_fails_the_call() {
    let e = run_err("fail()");
    assert_eq!(e.kind, ErrorKind::Raised);
    assert_eq!(e.message, "boom");
}
