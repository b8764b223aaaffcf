mod runtime;

pub use runtime::*;

#[cfg(test)]
mod concurrency_test;
