use anyhow::Context;
use wasmi::{
    core::{HostError, Trap},
    Caller, Engine, Extern, Func, Instance, Linker, Memory, Module, Store,
};

use crate::{
    stdio::{guest_range, StdioError},
    Abi, Backend, MemoryAccess, Stdio,
};

impl HostError for StdioError {}

/// A [`Backend`] running modules on the [`wasmi`] interpreter.
pub struct WasmiBackend {
    instance: Instance,
    store: Store<HostState>,
    entry_point: String,
}

impl WasmiBackend {
    /// Compile and instantiate `image`, linking the stdio imports named by `abi`.
    pub fn new(image: &[u8], abi: &Abi, stdio: Stdio) -> anyhow::Result<Self> {
        let engine = Engine::default();
        let module = Module::new(&engine, image)
            .map_err(wasmi::Error::from)
            .context("compiling module")?;

        let mut store = Store::new(
            &engine,
            HostState {
                stdio,
                memory_access: abi.memory_access,
                memory_export: abi.memory_export.clone(),
                memory: None,
                started: false,
            },
        );

        let mut linker = <Linker<HostState>>::new(&engine);
        let env: [(&str, Func); 2] = [
            (abi.read_import.as_str(), read_stdio(&mut store)),
            (abi.write_import.as_str(), write_stdio(&mut store)),
        ];

        for (name, func) in env {
            linker
                .define(&abi.namespace, name, func)
                .map_err(wasmi::Error::from)
                .with_context(|| format!("defining import '{}::{name}'", abi.namespace))?;
        }

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(wasmi::Error::from)
            .context("instantiating module")?
            .start(&mut store)
            .map_err(wasmi::Error::from)
            .context("running module start function")?;

        if abi.memory_access == MemoryAccess::Cached {
            let memory = instance
                .get_memory(&store, &abi.memory_export)
                .ok_or_else(|| StdioError::MissingMemory {
                    name: abi.memory_export.clone(),
                })?;

            store.data_mut().memory = Some(memory);
        }
        store.data_mut().started = true;

        log::debug!(
            "instantiated module ({} bytes) with {} memory access",
            image.len(),
            abi.memory_access
        );

        Ok(Self {
            instance,
            store,
            entry_point: abi.entry_point.clone(),
        })
    }
}

impl Backend for WasmiBackend {
    fn call_entry(&mut self) -> anyhow::Result<()> {
        let entry = self
            .instance
            .get_typed_func::<(), ()>(&self.store, &self.entry_point)
            .with_context(|| format!("resolving entry point '{}'", self.entry_point))?;

        log::debug!("calling '{}'", self.entry_point);

        entry
            .call(&mut self.store, ())
            .with_context(|| format!("calling entry point '{}'", self.entry_point))?;

        Ok(())
    }
}

/// The loader context every host call sees.
struct HostState {
    stdio: Stdio,
    memory_access: MemoryAccess,
    memory_export: String,
    // only set for MemoryAccess::Cached
    memory: Option<Memory>,
    // false while the start section runs; memory is not reachable yet
    started: bool,
}

fn memory(caller: &Caller<'_, HostState>) -> Result<Memory, StdioError> {
    let state = caller.data();

    let memory = match state.memory_access {
        _ if !state.started => None,
        MemoryAccess::Cached => state.memory,
        MemoryAccess::Dynamic => caller
            .get_export(&state.memory_export)
            .and_then(Extern::into_memory),
    };

    memory.ok_or_else(|| StdioError::MissingMemory {
        name: state.memory_export.clone(),
    })
}

fn read_stdio(store: &mut Store<HostState>) -> Func {
    Func::wrap(
        store,
        |mut caller: Caller<'_, HostState>, fd: i32, buf: i32, count: i32| -> Result<i32, Trap> {
            let (buf, count) = (buf as u32, count as u32);
            let memory = memory(&caller)?;
            let memory_len = memory.data(&caller).len();
            let range = guest_range(memory_len, buf, count)?;

            let mut scratch = vec![0; range.len()];
            let read = caller.data_mut().stdio.read(fd, &mut scratch)?;

            memory
                .write(&mut caller, range.start, &scratch[..read])
                .map_err(|_| StdioError::OutOfBounds {
                    offset: buf,
                    count,
                    memory_len,
                })?;

            log::trace!("read_stdio(fd: {fd}, buf: {buf}, count: {count}) -> {read}");
            Ok(read as i32)
        },
    )
}

fn write_stdio(store: &mut Store<HostState>) -> Func {
    Func::wrap(
        store,
        |mut caller: Caller<'_, HostState>, fd: i32, buf: i32, count: i32| -> Result<i32, Trap> {
            let (buf, count) = (buf as u32, count as u32);
            let memory = memory(&caller)?;
            let range = guest_range(memory.data(&caller).len(), buf, count)?;

            let scratch = memory.data(&caller)[range].to_vec();
            let written = caller.data_mut().stdio.write(fd, &scratch)?;

            log::trace!("write_stdio(fd: {fd}, buf: {buf}, count: {count}) -> {written}");
            Ok(written as i32)
        },
    )
}
