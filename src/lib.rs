#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod abi;
pub mod payload;
pub mod stdio;

#[doc(inline)]
pub use crate::abi::{Abi, MemoryAccess};
#[doc(inline)]
pub use crate::payload::PayloadFormat;
#[doc(inline)]
pub use crate::stdio::{Stdio, StdioError};

#[cfg(feature = "wasmer")]
pub mod wasmer_backend;

#[cfg(feature = "wasmer")]
#[doc(inline)]
pub use crate::wasmer_backend::WasmerBackend;

#[cfg(feature = "wasmi")]
pub mod wasmi_backend;

#[cfg(feature = "wasmi")]
#[doc(inline)]
pub use crate::wasmi_backend::WasmiBackend;

/// Common trait for WebAssembly backends.
///
/// A backend is constructed from a module image, an [`Abi`] and a [`Stdio`]
/// capability; construction compiles and instantiates the module, so by the
/// time a backend exists the imports are linked and the memory is reachable.
pub trait Backend {
    /// Call the module's entry point ([`Abi::entry_point`]) with no arguments.
    ///
    /// Fails if the export is missing, has the wrong type, or traps. A trap
    /// raised by a host call carries the [`StdioError`] that caused it.
    fn call_entry(&mut self) -> anyhow::Result<()>;
}

/// Run a backend's entry point to completion.
pub fn launch<B: Backend>(mut backend: B) -> anyhow::Result<()> {
    backend.call_entry()?;
    log::info!("entry point returned");

    Ok(())
}
