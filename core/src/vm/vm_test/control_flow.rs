use super::*;

#[test]
fn test_c_style_for_loop() {
    assert_eq!(run("sum := 0\nfor i := 0; i < 5; i++ { sum += i }\nsum"), Val::Int(10));
}

#[test]
fn test_condition_only_loop() {
    assert_eq!(run("n := 1\nfor n < 100 { n *= 2 }\nn"), Val::Int(128));
}

#[test]
fn test_infinite_loop_with_break() {
    assert_eq!(run("n := 0\nfor { n++\n if n == 7 { break } }\nn"), Val::Int(7));
}

#[test]
fn test_continue_runs_post_statement() {
    let src = "
odd := []
for i := 0; i < 6; i++ {
  if i % 2 == 0 { continue }
  odd.append(i)
}
odd
";
    assert_eq!(run(src), ints(&[1, 3, 5]));
}

#[test]
fn test_nested_loops_break_inner_only() {
    let src = "
pairs := 0
for i := 0; i < 3; i++ {
  for j := 0; j < 3; j++ {
    if j > i { break }
    pairs++
  }
}
pairs
";
    assert_eq!(run(src), Val::Int(6));
}

#[test]
fn test_range_over_list() {
    let src = "
keys := []
vals := []
for i, v := range [10, 20, 30] {
  keys.append(i)
  vals.append(v)
}
[keys, vals]
";
    assert_eq!(run(src), Val::list(vec![ints(&[0, 1, 2]), ints(&[10, 20, 30])]));
}

#[test]
fn test_range_over_int() {
    assert_eq!(run("sum := 0\nfor i := range 5 { sum += i }\nsum"), Val::Int(10));
    assert_eq!(run("n := 0\nfor range 4 { n++ }\nn"), Val::Int(4));
}

#[test]
fn test_range_over_map_is_sorted() {
    let src = "
out := []
for k, v := range {\"b\": 2, \"a\": 1, \"c\": 3} {
  out.append(k)
  out.append(v)
}
out
";
    let expect = Val::list(vec![
        Val::from("a"),
        Val::Int(1),
        Val::from("b"),
        Val::Int(2),
        Val::from("c"),
        Val::Int(3),
    ]);
    assert_eq!(run(src), expect);
}

#[test]
fn test_range_over_brace_literal_with_one_name() {
    assert_eq!(
        run("out := \"\"\nfor k := range {\"b\": 2, \"a\": 1} { out += k }\nout"),
        Val::from("ab")
    );
    assert_eq!(run("n := 0\nfor range {1, 2, 3} { n++ }\nn"), Val::Int(3));
}

#[test]
fn test_range_over_string() {
    let src = "
out := []
for _, c := range \"héllo\" { out.append(c) }
len(out)
";
    assert_eq!(run(src), Val::Int(5));
}

#[test]
fn test_range_break_and_continue() {
    let src = "
seen := []
for x := range [1, 2, 3, 4, 5] {
  if x == 2 { continue }
  if x == 4 { break }
  seen.append(x)
}
seen
";
    assert_eq!(run(src), ints(&[1, 3]));
}

#[test]
fn test_range_over_non_iterable() {
    let e = run_err("for x := range nil { x }");
    assert_eq!(e.kind, ErrorKind::Type);
}

#[test]
fn test_loop_inside_function_returns_early() {
    let src = "
func find(xs, want) {
  for i, x := range xs {
    if x == want { return i }
  }
  return -1
}
[find([5, 6, 7], 7), find([5], 9)]
";
    assert_eq!(run(src), ints(&[2, -1]));
}

#[test]
fn test_stack_stays_balanced_over_many_iterations() {
    let limits = Limits {
        max_stack: 32,
        ..Limits::default()
    };
    let src = "
total := 0
for i := range 10000 {
  x := [i, i + 1]
  total += x[1] - x[0]
}
total
";
    assert_eq!(run_with(src, options().with_limits(limits)).unwrap(), Val::Int(10000));
}
