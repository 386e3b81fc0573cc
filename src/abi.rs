//! Names and conventions shared between the loader and a module.

use std::{fmt, str::FromStr};

/// How host calls find the module's linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryAccess {
    /// Look the memory export up in the instance's export table on every call.
    #[default]
    Dynamic,
    /// Capture the memory export once, right after instantiation.
    Cached,
}

impl FromStr for MemoryAccess {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dynamic" => Ok(MemoryAccess::Dynamic),
            "cached" => Ok(MemoryAccess::Cached),
            _ => Err(format!(
                "unknown memory access '{s}', expected 'dynamic' or 'cached'"
            )),
        }
    }
}

impl fmt::Display for MemoryAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MemoryAccess::Dynamic => "dynamic",
            MemoryAccess::Cached => "cached",
        })
    }
}

/// The import/export surface a module is linked against.
///
/// Both imports have the signature `(fd: i32, buf: i32, count: i32) -> i32`
/// and live in [`namespace`](Abi::namespace). The entry point takes nothing
/// and returns nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abi {
    pub namespace: String,
    pub read_import: String,
    pub write_import: String,
    pub entry_point: String,
    pub memory_export: String,
    pub memory_access: MemoryAccess,
}

impl Abi {
    /// `svc_read_stdio`/`svc_write_stdio`, entered through `_basm_start`,
    /// memory looked up on every call.
    pub fn dynamic() -> Self {
        Self {
            namespace: "env".to_string(),
            read_import: "svc_read_stdio".to_string(),
            write_import: "svc_write_stdio".to_string(),
            entry_point: "_basm_start".to_string(),
            memory_export: "memory".to_string(),
            memory_access: MemoryAccess::Dynamic,
        }
    }

    /// `wasm_svc_read_stdio`/`wasm_svc_write_stdio`, entered through `_start`,
    /// memory captured once at instantiation.
    pub fn cached() -> Self {
        Self {
            namespace: "env".to_string(),
            read_import: "wasm_svc_read_stdio".to_string(),
            write_import: "wasm_svc_write_stdio".to_string(),
            entry_point: "_start".to_string(),
            memory_export: "memory".to_string(),
            memory_access: MemoryAccess::Cached,
        }
    }

    /// The preset whose memory access matches `access`.
    pub fn preset(access: MemoryAccess) -> Self {
        match access {
            MemoryAccess::Dynamic => Self::dynamic(),
            MemoryAccess::Cached => Self::cached(),
        }
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    pub fn with_memory_access(mut self, memory_access: MemoryAccess) -> Self {
        self.memory_access = memory_access;
        self
    }
}

impl Default for Abi {
    fn default() -> Self {
        Self::dynamic()
    }
}
