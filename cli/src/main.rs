use std::{fmt, fs, path::PathBuf, str::FromStr};

use anyhow::Context;
use argh::FromArgs;
use wasmboot::{payload, Abi, MemoryAccess, PayloadFormat, Stdio, WasmiBackend};

/// Substituted by build.rs from `$WASMBOOT_PAYLOAD`, or the bare placeholder.
const EMBEDDED_PAYLOAD: &str = include_str!(concat!(env!("OUT_DIR"), "/payload.b64"));

#[derive(FromArgs)]
#[argh(description = "Run a compressed WebAssembly program against stdin and stdout.")]
struct Args {
    #[argh(
        positional,
        description = "payload file to run instead of the embedded payload"
    )]
    payload: Option<PathBuf>,
    #[argh(
        option,
        short = 'f',
        default = "PayloadFormat::Base64Deflate",
        description = "encoding of the payload file: base64, deflate or wasm"
    )]
    format: PayloadFormat,
    #[argh(
        option,
        short = 'v',
        default = "MemoryAccess::Dynamic",
        description = "loader variant: dynamic (svc_*, _basm_start) or cached (wasm_svc_*, _start)"
    )]
    variant: MemoryAccess,
    #[argh(option, short = 'e', description = "entry point export to call")]
    entry: Option<String>,
    #[argh(
        option,
        short = 'm',
        description = "how host calls find linear memory: dynamic or cached"
    )]
    memory: Option<MemoryAccess>,
    #[argh(
        option,
        short = 'b',
        default = "BackendKind::Wasmi",
        description = "webassembly engine: wasmi or wasmer"
    )]
    backend: BackendKind,
}

#[derive(Clone, Copy)]
enum BackendKind {
    Wasmi,
    Wasmer,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wasmi" => Ok(BackendKind::Wasmi),
            "wasmer" => Ok(BackendKind::Wasmer),
            _ => Err(format!("unknown backend '{s}', expected 'wasmi' or 'wasmer'")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Wasmi => "wasmi",
            BackendKind::Wasmer => "wasmer",
        })
    }
}

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    pretty_env_logger::init();

    let image = match &args.payload {
        Some(path) => {
            let bytes = fs::read(path)
                .with_context(|| format!("failed to read payload {}", path.display()))?;
            args.format.decode(&bytes)?
        }
        None => payload::decompress(EMBEDDED_PAYLOAD)?,
    };

    let mut abi = Abi::preset(args.variant);
    if let Some(entry) = args.entry {
        abi = abi.with_entry_point(entry);
    }
    if let Some(memory) = args.memory {
        abi = abi.with_memory_access(memory);
    }

    log::debug!("running {} byte module on {} with {abi:?}", image.len(), args.backend);

    match args.backend {
        BackendKind::Wasmi => wasmboot::launch(WasmiBackend::new(&image, &abi, Stdio::inherit())?),
        #[cfg(feature = "wasmer")]
        BackendKind::Wasmer => wasmboot::launch(wasmboot::WasmerBackend::new(
            &image,
            &abi,
            Stdio::inherit(),
        )?),
        #[cfg(not(feature = "wasmer"))]
        BackendKind::Wasmer => anyhow::bail!("this build of wasmboot has no wasmer backend"),
    }
}
