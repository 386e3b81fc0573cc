use anyhow::Context;
use wasmer::{
    Exports, Function, FunctionEnv, FunctionEnvMut, Imports, Instance, Memory, Module, Store,
    TypedFunction,
};

use crate::{
    stdio::{guest_range, StdioError},
    Abi, Backend, MemoryAccess, Stdio,
};

/// A [`Backend`] running modules on [`wasmer`].
pub struct WasmerBackend {
    store: Store,
    instance: Instance,
    entry_point: String,
}

impl WasmerBackend {
    /// Compile and instantiate `image`, linking the stdio imports named by `abi`.
    pub fn new(image: &[u8], abi: &Abi, stdio: Stdio) -> anyhow::Result<Self> {
        let mut store = Store::default();
        let module = Module::new(&store, image).context("compiling module")?;

        let fn_env = FunctionEnv::new(
            &mut store,
            HostEnv {
                stdio,
                memory_access: abi.memory_access,
                memory_export: abi.memory_export.clone(),
                memory: None,
                exports: None,
            },
        );

        let mut imports = Imports::new();
        imports.define(
            &abi.namespace,
            &abi.read_import,
            Function::new_typed_with_env(&mut store, &fn_env, read_stdio),
        );
        imports.define(
            &abi.namespace,
            &abi.write_import,
            Function::new_typed_with_env(&mut store, &fn_env, write_stdio),
        );

        let instance =
            Instance::new(&mut store, &module, &imports).context("instantiating module")?;

        let env = fn_env.as_mut(&mut store);
        match abi.memory_access {
            MemoryAccess::Cached => {
                let memory = instance
                    .exports
                    .get_memory(&abi.memory_export)
                    .map_err(|_| StdioError::MissingMemory {
                        name: abi.memory_export.clone(),
                    })?;

                env.memory = Some(memory.clone());
            }
            MemoryAccess::Dynamic => env.exports = Some(instance.exports.clone()),
        }

        log::debug!(
            "instantiated module ({} bytes) with {} memory access",
            image.len(),
            abi.memory_access
        );

        Ok(Self {
            store,
            instance,
            entry_point: abi.entry_point.clone(),
        })
    }
}

impl Backend for WasmerBackend {
    fn call_entry(&mut self) -> anyhow::Result<()> {
        let entry: TypedFunction<(), ()> = self
            .instance
            .exports
            .get_typed_function(&self.store, &self.entry_point)
            .with_context(|| format!("resolving entry point '{}'", self.entry_point))?;

        log::debug!("calling '{}'", self.entry_point);

        entry
            .call(&mut self.store)
            .with_context(|| format!("calling entry point '{}'", self.entry_point))?;

        Ok(())
    }
}

struct HostEnv {
    stdio: Stdio,
    memory_access: MemoryAccess,
    memory_export: String,
    // set for MemoryAccess::Cached
    memory: Option<Memory>,
    // set for MemoryAccess::Dynamic
    exports: Option<Exports>,
}

impl HostEnv {
    fn memory(&self) -> Result<Memory, StdioError> {
        let memory = match self.memory_access {
            MemoryAccess::Cached => self.memory.clone(),
            MemoryAccess::Dynamic => self
                .exports
                .as_ref()
                .and_then(|exports| exports.get_memory(&self.memory_export).ok())
                .cloned(),
        };

        memory.ok_or_else(|| StdioError::MissingMemory {
            name: self.memory_export.clone(),
        })
    }
}

fn read_stdio(
    mut env: FunctionEnvMut<HostEnv>,
    fd: i32,
    buf: i32,
    count: i32,
) -> Result<i32, StdioError> {
    let (buf, count) = (buf as u32, count as u32);
    let (host, store) = env.data_and_store_mut();

    let memory = host.memory()?;
    let view = memory.view(&store);
    let memory_len = view.data_size() as usize;
    let range = guest_range(memory_len, buf, count)?;

    let mut scratch = vec![0; range.len()];
    let read = host.stdio.read(fd, &mut scratch)?;

    view.write(range.start as u64, &scratch[..read])
        .map_err(|_| StdioError::OutOfBounds {
            offset: buf,
            count,
            memory_len,
        })?;

    log::trace!("read_stdio(fd: {fd}, buf: {buf}, count: {count}) -> {read}");
    Ok(read as i32)
}

fn write_stdio(
    mut env: FunctionEnvMut<HostEnv>,
    fd: i32,
    buf: i32,
    count: i32,
) -> Result<i32, StdioError> {
    let (buf, count) = (buf as u32, count as u32);
    let (host, store) = env.data_and_store_mut();

    let memory = host.memory()?;
    let view = memory.view(&store);
    let memory_len = view.data_size() as usize;
    let range = guest_range(memory_len, buf, count)?;

    let mut scratch = vec![0; range.len()];
    view.read(range.start as u64, &mut scratch)
        .map_err(|_| StdioError::OutOfBounds {
            offset: buf,
            count,
            memory_len,
        })?;
    let written = host.stdio.write(fd, &scratch)?;

    log::trace!("write_stdio(fd: {fd}, buf: {buf}, count: {count}) -> {written}");
    Ok(written as i32)
}
