use std::{env, fs};

// keep in sync with wasmboot::payload::PLACEHOLDER
const PLACEHOLDER: &str = "$$$$binary_base64$$$$";

fn main() {
    println!("cargo:rerun-if-env-changed=WASMBOOT_PAYLOAD");

    let payload = match env::var("WASMBOOT_PAYLOAD") {
        Ok(path) if !path.is_empty() => {
            println!("cargo:rerun-if-changed={path}");
            fs::read_to_string(&path)
                .unwrap_or_else(|err| panic!("failed to read payload {path}: {err}"))
        }
        _ => PLACEHOLDER.to_string(),
    };

    fs::write(
        format!("{}/payload.b64", env::var("OUT_DIR").unwrap()),
        payload.trim(),
    )
    .unwrap();
}
