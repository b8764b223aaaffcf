use std::sync::Arc;

use anyhow::Result;

use crate::error::{ErrorKind, err};
use crate::import::ImportContext;
use crate::module::ModuleValue;
use crate::val::Val;

use super::VirtualMachine;
use super::frame::{Frame, Locals, STOP};

impl VirtualMachine {
    /// Load, run and cache a module. Every VM sharing this one's state sees
    /// the same module value and the body runs once, even when several
    /// tasks import it at the same time. A failed import is not cached.
    pub(super) fn import_module(&mut self, name: &str) -> Result<Arc<ModuleValue>> {
        let key = name.replace('/', ".");
        if let Some(module) = self.shared.modules.get(&key).and_then(|cell| cell.get().cloned()) {
            tracing::trace!(module = %key, "module cache hit");
            return Ok(module);
        }
        if let Some(Val::Module(module)) = self.shared.host.get(key.as_str()) {
            return Ok(module.clone());
        }
        // re-entering the cell's initializer on this thread would never return
        if self.importing.contains(&key) {
            return Err(err(ErrorKind::Import, format!("circular import of module \"{key}\"")));
        }

        let cell = self.shared.modules.entry(key.clone()).or_default().clone();
        self.importing.push(key.clone());
        let result = cell.get_or_try_init(|| self.load_module(name, &key));
        self.importing.pop();
        result.cloned()
    }

    fn load_module(&mut self, name: &str, key: &str) -> Result<Arc<ModuleValue>> {
        let importer = self
            .shared
            .importer
            .clone()
            .ok_or_else(|| err(ErrorKind::Import, format!("module \"{name}\" not found")))?;
        let ctx = ImportContext {
            cancel: &self.cancel,
            global_names: &self.shared.host_names,
        };
        let loaded = importer.import(&ctx, name)?;
        let globals = self.shared.seeded_globals(&loaded.code.global_names);

        let max_frames = self.shared.limits.max_frames;
        if self.frames.len() >= max_frames {
            return Err(err(
                ErrorKind::Resource,
                format!("maximum call depth exceeded (limit {max_frames})"),
            ));
        }
        let code = loaded.code.clone();
        self.frames.push(Frame::new(
            code.clone(),
            globals.clone(),
            Locals::new(code.locals_count),
            STOP,
            self.stack.len(),
        ));
        self.run_frame()?;

        let module = ModuleValue::new(loaded.name.clone(), code, globals);
        tracing::debug!(module = %key, members = module.len(), "module imported");
        Ok(module)
    }
}
