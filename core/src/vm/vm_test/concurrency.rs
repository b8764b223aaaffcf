use super::*;

fn native_spawn(args: &[Val], ctx: &mut VmContext<'_>) -> Result<Val> {
    let Some((callee, rest)) = args.split_first() else {
        return Err(anyhow::anyhow!("spawn: missing function"));
    };
    Ok(Val::Task(ctx.spawn(callee.clone(), rest.to_vec())?))
}

fn spawn_options() -> VmOptions {
    options().with_global("spawn", Val::Builtin(Builtin::new("spawn", native_spawn)))
}

#[test]
fn test_buffered_channel_send_receive_close() {
    let src = "
c := chan(2)
c <- 1
c <- 2
close(c)
[<-c, <-c, <-c]
";
    assert_eq!(run(src), Val::list(vec![Val::Int(1), Val::Int(2), Val::Nil]));
}

#[test]
fn test_receive_method_reports_closed() {
    let src = "
c := chan(2)
c <- nil
c.send(4)
close(c)
[c.receive(), c.receive(), c.receive(), <-c]
";
    let pair = |v: Val, ok: bool| Val::list(vec![v, Val::Bool(ok)]);
    assert_eq!(
        run(src),
        Val::list(vec![
            pair(Val::Nil, true),
            pair(Val::Int(4), true),
            pair(Val::Nil, false),
            Val::Nil,
        ])
    );
}

#[test]
fn test_go_statement_feeds_channel() {
    init_tracing();
    let src = "
c := chan()
func produce(n) {
  for i := range n { c <- i }
  close(c)
}
go produce(4)
total := 0
for v := range c { total += v }
total
";
    assert_eq!(run(src), Val::Int(6));
}

#[test]
fn test_channel_range_key_counts_receives() {
    let src = "
c := chan(3)
c <- \"a\"
c <- \"b\"
close(c)
keys := []
for k, v := range c { keys.append(k) }
keys
";
    assert_eq!(run(src), ints(&[1, 2]));
}

#[test]
fn test_spawned_task_result() {
    let src = "
t := spawn(func(a, b) { a * b }, 6, 7)
t.wait()
";
    assert_eq!(run_with(src, spawn_options()).unwrap(), Val::Int(42));
}

#[test]
fn test_tasks_share_globals() {
    let src = "
hits := chan(10)
func worker(id) { hits <- id }
tasks := []
for i := range 5 { tasks.append(spawn(worker, i)) }
for t := range tasks { t.wait() }
close(hits)
n := 0
for h := range hits { n++ }
n
";
    assert_eq!(run_with(src, spawn_options()).unwrap(), Val::Int(5));
}

#[test]
fn test_task_failure_surfaces_on_wait() {
    let src = "
t := spawn(func() { 1 + nil })
t.wait()
";
    let e = VmError::from_anyhow(&run_with(src, spawn_options()).unwrap_err());
    assert_eq!(e.kind, ErrorKind::Type);
}

#[test]
fn test_send_on_closed_channel_fails() {
    let e = run_err("c := chan(1)\nclose(c)\nc <- 1");
    assert!(e.message.contains("closed"), "{}", e.message);
}

#[test]
fn test_send_to_non_channel() {
    let e = run_err("x := 1\nx <- 2");
    assert_eq!(e.kind, ErrorKind::Type);
    assert_eq!(e.message, "cannot send to int object");
}

#[test]
fn test_spawn_requires_callable() {
    let e = VmError::from_anyhow(&run_with("spawn(3)", spawn_options()).unwrap_err());
    assert_eq!(e.kind, ErrorKind::Type);
    assert_eq!(e.message, "int object is not callable");
}

#[test]
fn test_go_requires_concurrency() {
    let src = "x := 0\nfunc f() { x = 1 }\ngo f()\n\"started\"";
    let mut vm = vm_for(src, options().with_concurrency(false)).unwrap();
    let e = VmError::from_anyhow(&vm.run().unwrap_err());
    assert_eq!(e.kind, ErrorKind::Eval);
    assert!(e.message.contains("concurrency is disabled"), "{}", e.message);
    assert_eq!(vm.get("x"), Some(Val::Int(0)));

    let e = run_with("spawn(func() { 1 })", spawn_options().with_concurrency(false)).unwrap_err();
    assert_eq!(VmError::kind_of(&e), ErrorKind::Eval);
}
