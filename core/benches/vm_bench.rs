use std::hint::black_box;
use std::sync::Arc;

use brook_core::val::Val;
use brook_core::vm::{Code, VirtualMachine, VmOptions, compile_source};
use criterion::{Criterion, criterion_group, criterion_main};

const FIB: &str = "
func fib(n) {
  if n < 2 { return n }
  return fib(n - 1) + fib(n - 2)
}
fib(20)
";

const LOOP: &str = "
total := 0
for i := 0; i < 10000; i++ { total += i % 7 }
total
";

const CLOSURES: &str = "
func counter() {
  n := 0
  return func() { n++\n n }
}
c := counter()
for range 5000 { c() }
c()
";

const CONTAINERS: &str = "
xs := []
for i := range 2000 { xs.append(i) }
m := {}
for i, x := range xs { m[`k{i}`] = x * 2 }
sum := 0
for _, v := range m { sum += v }
sum
";

fn compiled(src: &str) -> Arc<Code> {
    compile_source(src, "bench", &[]).unwrap()
}

fn run(code: &Arc<Code>) -> Val {
    let mut vm = VirtualMachine::new(code.clone(), VmOptions::new());
    vm.run().unwrap();
    vm.tos().unwrap_or_default()
}

fn vm_bench(c: &mut Criterion) {
    for (name, src) in [
        ("vm_fib_20", FIB),
        ("vm_for_loop_10k", LOOP),
        ("vm_closure_calls_5k", CLOSURES),
        ("vm_list_map_2k", CONTAINERS),
    ] {
        let code = compiled(src);
        c.bench_function(name, |b| b.iter(|| black_box(run(&code))));
    }

    c.bench_function("compile_fib", |b| b.iter(|| black_box(compiled(FIB))));
}

fn host_call_bench(c: &mut Criterion) {
    let code = compiled("func add(a, b) { a + b }");
    let mut vm = VirtualMachine::new(code, VmOptions::new());
    vm.run().unwrap();
    let add = vm.get("add").unwrap();
    c.bench_function("host_call_add", |b| {
        b.iter(|| black_box(vm.call(&add, &[Val::Int(1), Val::Int(2)]).unwrap()))
    });
}

criterion_group!(benches, vm_bench, host_call_bench);
criterion_main!(benches);
