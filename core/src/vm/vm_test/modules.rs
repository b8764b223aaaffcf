use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use super::*;
use crate::import::LocalImporter;
use crate::module::ModuleValue;

fn importer() -> MemoryImporter {
    MemoryImporter::new()
        .with_module(
            "math",
            "
PI := 3
func square(x) { x * x }
func area(r) { PI * square(r) }
",
        )
        .with_module("state", "items := []\nfunc add(x) { items.append(x)\n len(items) }")
        .with_module("util/strings", "func shout(s) { s.upper() }")
        .with_module("broken", "x := 1 + nil")
}

fn run_modules(src: &str) -> Result<Val> {
    run_with(src, options().with_importer(importer()))
}

#[test]
fn test_import_and_attribute_access() {
    init_tracing();
    assert_eq!(run_modules("import math\nmath.area(2)").unwrap(), Val::Int(12));
    assert_eq!(run_modules("import math as m\nm.PI").unwrap(), Val::Int(3));
}

#[test]
fn test_dotted_and_slashed_paths() {
    assert_eq!(
        run_modules("import util.strings\nstrings.shout(\"hi\")").unwrap(),
        Val::from("HI")
    );
    assert_eq!(
        run_modules("from util.strings import shout\nshout(\"a\")").unwrap(),
        Val::from("A")
    );
}

#[test]
fn test_from_import_with_alias() {
    let src = "from math import square as sq, PI\nsq(PI)";
    assert_eq!(run_modules(src).unwrap(), Val::Int(9));
}

#[test]
fn test_module_is_executed_once() {
    let src = "
import state
import state as again
state.add(1)
again.add(2)
";
    assert_eq!(run_modules(src).unwrap(), Val::Int(2));
}

#[test]
fn test_clones_share_module_cache() {
    let mut vm = vm_for("import state\nstate.add(1)", options().with_importer(importer())).unwrap();
    vm.run().unwrap();
    let mut clone = vm.clone_vm();
    clone.run().unwrap();
    assert_eq!(clone.tos(), Some(Val::Int(2)));
}

static SLOW_BODY_RUNS: AtomicUsize = AtomicUsize::new(0);

fn native_bump(_args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    let n = SLOW_BODY_RUNS.fetch_add(1, Ordering::SeqCst) + 1;
    thread::sleep(Duration::from_millis(50));
    Ok(Val::Int(n as i64))
}

#[test]
fn test_concurrent_imports_run_body_once() {
    let importer = MemoryImporter::new().with_module("slow", "hits := bump()");
    let options = options()
        .with_importer(importer)
        .with_global("bump", Val::Builtin(Builtin::new("bump", native_bump)));
    let vm = vm_for("import slow\nslow.hits", options).unwrap();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let mut clone = vm.clone_vm();
            thread::spawn(move || {
                clone.run().unwrap();
                clone.tos()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), Some(Val::Int(1)));
    }
    assert_eq!(SLOW_BODY_RUNS.load(Ordering::SeqCst), 1);
}

#[test]
fn test_circular_import_fails() {
    let importer = MemoryImporter::new()
        .with_module("ping", "import pong\nx := 1")
        .with_module("pong", "import ping\ny := 2");
    let e = VmError::from_anyhow(&run_with("import ping", options().with_importer(importer)).unwrap_err());
    assert_eq!(e.kind, ErrorKind::Import);
    assert_eq!(e.message, "circular import of module \"ping\"");
}

#[test]
fn test_failed_import_is_retried() {
    let importer = MemoryImporter::new().with_module("flaky", "func f() { 1 }\nfail()");
    let mut vm = vm_for("import flaky", options().with_importer(importer)).unwrap();
    for _ in 0..2 {
        let e = VmError::from_anyhow(&vm.run().unwrap_err());
        assert_eq!(e.message, "boom");
    }
}

#[test]
fn test_missing_module() {
    let e = VmError::from_anyhow(&run_modules("x := 1\nimport nowhere").unwrap_err());
    assert_eq!(e.kind, ErrorKind::Import);
    assert_eq!(e.message, "module \"nowhere\" not found");
    assert_eq!(e.position.map(|p| p.line), Some(2));
}

#[test]
fn test_missing_name_in_module() {
    let e = VmError::from_anyhow(&run_modules("from math import cube").unwrap_err());
    assert_eq!(e.kind, ErrorKind::Import);
    assert!(e.message.contains("cannot import name \"cube\""), "{}", e.message);
}

#[test]
fn test_missing_module_attribute() {
    let e = VmError::from_anyhow(&run_modules("import math\nmath.tau").unwrap_err());
    assert_eq!(e.kind, ErrorKind::Eval);
    assert!(e.message.contains("not found on module \"math\""), "{}", e.message);
}

#[test]
fn test_failing_module_body() {
    let e = VmError::from_anyhow(&run_modules("import broken").unwrap_err());
    assert_eq!(e.kind, ErrorKind::Type);
    assert_eq!(e.position.map(|p| p.line), Some(1));
}

#[test]
fn test_import_without_importer() {
    let e = run_err("import math");
    assert_eq!(e.kind, ErrorKind::Import);
}

#[test]
fn test_native_module_from_host_globals() {
    let module = ModuleValue::native("consts", [("answer", Val::Int(42))]);
    let options = options().with_global("consts", Val::Module(module));
    assert_eq!(run_with("import consts as c\nc.answer", options).unwrap(), Val::Int(42));
}

#[test]
fn test_local_importer_loads_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("lib")).unwrap();
    std::fs::write(dir.path().join("lib/greet.brk"), "func hello(n) { `hello {n}` }").unwrap();
    let options = options().with_importer(LocalImporter::new(dir.path()));
    assert_eq!(
        run_with("import lib.greet\ngreet.hello(\"you\")", options).unwrap(),
        Val::from("hello you")
    );
}
