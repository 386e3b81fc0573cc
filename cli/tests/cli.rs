use std::{fs, io::Write, path::PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{write::DeflateEncoder, Compression};
use predicates::prelude::*;
use tempfile::TempDir;

const HELLO: &str = r#"
    (module
        (import "env" "svc_write_stdio" (func $write (param i32 i32 i32) (result i32)))
        (memory (export "memory") 1)
        (data (i32.const 16) "hello")
        (func (export "_basm_start")
            (drop (call $write (i32.const 1) (i32.const 16) (i32.const 5)))))
"#;

const ECHO: &str = r#"
    (module
        (import "env" "wasm_svc_read_stdio" (func $read (param i32 i32 i32) (result i32)))
        (import "env" "wasm_svc_write_stdio" (func $write (param i32 i32 i32) (result i32)))
        (memory (export "memory") 1)
        (func (export "_start")
            (local $n i32)
            (block $eof
                (loop $next
                    (local.set $n (call $read (i32.const 0) (i32.const 256) (i32.const 128)))
                    (br_if $eof (i32.eqz (local.get $n)))
                    (drop (call $write (i32.const 1) (i32.const 256) (local.get $n)))
                    (br $next)))))
"#;

fn deflate(image: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(image).unwrap();
    encoder.finish().unwrap()
}

fn payload_file(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write payload");
    path
}

#[test]
fn runs_base64_payload() {
    let dir = tempfile::tempdir().expect("temp dir");
    let text = STANDARD.encode(deflate(&wat::parse_str(HELLO).unwrap()));
    let path = payload_file(&dir, "hello.b64", text.as_bytes());

    cargo_bin_cmd!("wasmboot")
        .arg(&path)
        .assert()
        .success()
        .stdout("hello");
}

#[test]
fn echoes_stdin_with_cached_variant() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = payload_file(&dir, "echo.deflate", &deflate(&wat::parse_str(ECHO).unwrap()));

    cargo_bin_cmd!("wasmboot")
        .args(["--format", "deflate", "--variant", "cached"])
        .arg(&path)
        .write_stdin("abc")
        .assert()
        .success()
        .stdout("abc");
}

#[test]
fn memory_override_gives_same_output() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = payload_file(&dir, "echo.wasm", &wat::parse_str(ECHO).unwrap());
    let input = "same bytes either way\n".repeat(50);

    let cached = cargo_bin_cmd!("wasmboot")
        .args(["-f", "wasm", "-v", "cached"])
        .arg(&path)
        .write_stdin(input.clone())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let dynamic = cargo_bin_cmd!("wasmboot")
        .args(["-f", "wasm", "-v", "cached", "-m", "dynamic"])
        .arg(&path)
        .write_stdin(input.clone())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert_eq!(cached, dynamic);
    assert_eq!(input.as_bytes(), cached.as_slice());
}

#[test]
fn truncated_payload_fails_without_output() {
    let dir = tempfile::tempdir().expect("temp dir");
    let compressed = deflate(&wat::parse_str(HELLO).unwrap());
    let text = STANDARD.encode(&compressed[..compressed.len() / 2]);
    let path = payload_file(&dir, "truncated.b64", text.as_bytes());

    cargo_bin_cmd!("wasmboot")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}

#[test]
fn entry_point_override() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = payload_file(&dir, "hello.wasm", &wat::parse_str(HELLO).unwrap());

    cargo_bin_cmd!("wasmboot")
        .args(["-f", "wasm", "-e", "main"])
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("entry point 'main'"));

    cargo_bin_cmd!("wasmboot")
        .args(["-f", "wasm", "-e", "_basm_start"])
        .arg(&path)
        .assert()
        .success()
        .stdout("hello");
}

#[test]
fn missing_payload_file_fails() {
    let dir = tempfile::tempdir().expect("temp dir");

    cargo_bin_cmd!("wasmboot")
        .arg(dir.path().join("absent.b64"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read payload"));
}

#[test]
fn unsubstituted_placeholder_is_reported() {
    if option_env!("WASMBOOT_PAYLOAD").is_some_and(|path| !path.is_empty()) {
        eprintln!("skipping unsubstituted_placeholder_is_reported (WASMBOOT_PAYLOAD is set)");
        return;
    }

    cargo_bin_cmd!("wasmboot")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("no payload embedded"));
}
