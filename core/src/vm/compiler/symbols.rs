use std::sync::Arc;

use crate::util::fast_map::{FastHashMap, fast_hash_map_new};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    Global,
    Local,
    Free,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Symbol {
    pub scope: Scope,
    pub index: u16,
    pub is_const: bool,
}

/// How the enclosing function provides a captured cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Capture {
    /// Promote the enclosing function's local to a cell.
    Local(u16),
    /// Pass along a cell the enclosing function captured itself.
    Free(u16),
}

#[derive(Debug, Default, Clone)]
struct FuncSymbols {
    blocks: Vec<FastHashMap<String, Symbol>>,
    locals_count: u16,
    free: Vec<Capture>,
    free_by_name: FastHashMap<String, Symbol>,
}

impl FuncSymbols {
    fn new() -> Self {
        Self {
            blocks: vec![fast_hash_map_new()],
            ..Default::default()
        }
    }
}

/// Scope chain of the function being compiled and every function enclosing it.
/// Declarations in the root block of the main function are globals; everything
/// else is a local slot of its function.
#[derive(Debug, Clone)]
pub(crate) struct SymbolTable {
    global_names: Vec<Arc<str>>,
    globals: FastHashMap<String, Symbol>,
    funcs: Vec<FuncSymbols>,
}

/// What a finished function needs from its symbols.
pub(crate) struct FuncLayout {
    pub locals_count: usize,
    pub captures: Vec<Capture>,
}

impl SymbolTable {
    /// Host globals are laid out in sorted order so equal name sets give equal layouts.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        let mut sorted: Vec<Arc<str>> = names.into_iter().map(Into::into).collect();
        sorted.sort_unstable();
        sorted.dedup();
        let mut table = Self {
            global_names: Vec::with_capacity(sorted.len()),
            globals: fast_hash_map_new(),
            funcs: vec![FuncSymbols::new()],
        };
        for name in sorted {
            table.add_global(&name, false);
        }
        table
    }

    pub fn global_names(&self) -> &[Arc<str>] {
        &self.global_names
    }

    fn add_global(&mut self, name: &str, is_const: bool) -> Symbol {
        let symbol = Symbol {
            scope: Scope::Global,
            index: self.global_names.len() as u16,
            is_const,
        };
        self.global_names.push(Arc::from(name));
        self.globals.insert(name.to_string(), symbol);
        symbol
    }

    fn at_global_level(&self) -> bool {
        self.funcs.len() == 1 && self.funcs[0].blocks.len() == 1
    }

    /// True while compiling the main body (outside any function literal).
    pub fn in_main(&self) -> bool {
        self.funcs.len() == 1
    }

    fn current(&mut self) -> &mut FuncSymbols {
        let last = self.funcs.len() - 1;
        &mut self.funcs[last]
    }

    pub fn push_block(&mut self) {
        self.current().blocks.push(fast_hash_map_new());
    }

    pub fn pop_block(&mut self) {
        self.current().blocks.pop();
    }

    pub fn push_func(&mut self) {
        self.funcs.push(FuncSymbols::new());
    }

    pub fn pop_func(&mut self) -> FuncLayout {
        let func = self.funcs.pop().unwrap_or_default();
        FuncLayout {
            locals_count: func.locals_count as usize,
            captures: func.free,
        }
    }

    /// Locals allocated so far in the current function, including the main body.
    pub fn locals_count(&self) -> usize {
        self.funcs.last().map(|f| f.locals_count as usize).unwrap_or(0)
    }

    /// Declare `name` in the innermost block. Redeclaring a name in the same
    /// block reuses its slot. Returns `None` when the name is a constant there.
    pub fn declare(&mut self, name: &str, is_const: bool) -> Option<Symbol> {
        if self.at_global_level() {
            return match self.globals.get(name).copied() {
                Some(existing) if existing.is_const => None,
                Some(existing) => {
                    let symbol = Symbol { is_const, ..existing };
                    self.globals.insert(name.to_string(), symbol);
                    Some(symbol)
                }
                None => Some(self.add_global(name, is_const)),
            };
        }
        let func = self.current();
        if let Some(existing) = func.blocks.last().and_then(|b| b.get(name)).copied() {
            if existing.is_const {
                return None;
            }
            let symbol = Symbol { is_const, ..existing };
            func.blocks.last_mut()?.insert(name.to_string(), symbol);
            return Some(symbol);
        }
        Some(self.declare_local(name, is_const))
    }

    /// Always allocates a fresh slot in the current function.
    pub fn declare_local(&mut self, name: &str, is_const: bool) -> Symbol {
        let func = self.current();
        let symbol = Symbol {
            scope: Scope::Local,
            index: func.locals_count,
            is_const,
        };
        func.locals_count += 1;
        if let Some(block) = func.blocks.last_mut() {
            block.insert(name.to_string(), symbol);
        }
        symbol
    }

    /// Anonymous slot for compiler temporaries.
    pub fn temp_local(&mut self) -> u16 {
        let func = self.current();
        let index = func.locals_count;
        func.locals_count += 1;
        index
    }

    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        let depth = self.funcs.len() - 1;
        self.resolve_in(depth, name)
    }

    fn resolve_in(&mut self, depth: usize, name: &str) -> Option<Symbol> {
        let func = &self.funcs[depth];
        for block in func.blocks.iter().rev() {
            if let Some(symbol) = block.get(name) {
                return Some(*symbol);
            }
        }
        if let Some(symbol) = func.free_by_name.get(name) {
            return Some(*symbol);
        }
        // The main function's root block stays empty; its names live in `globals`.
        if depth == 0 {
            return self.globals.get(name).copied();
        }
        let outer = self.resolve_in(depth - 1, name)?;
        let capture = match outer.scope {
            Scope::Global => return Some(outer),
            Scope::Local => Capture::Local(outer.index),
            Scope::Free => Capture::Free(outer.index),
        };
        let func = &mut self.funcs[depth];
        let symbol = Symbol {
            scope: Scope::Free,
            index: func.free.len() as u16,
            is_const: outer.is_const,
        };
        func.free.push(capture);
        func.free_by_name.insert(name.to_string(), symbol);
        Some(symbol)
    }
}
