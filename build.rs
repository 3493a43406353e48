use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=memory.x");

    // Host builds (tests, simulation) need no linker setup
    if env::var("CARGO_FEATURE_CH32V003").is_err() {
        return;
    }

    let target = env::var("TARGET").unwrap_or_default();
    if !target.starts_with("riscv32") {
        println!("cargo:warning=ch32v003 feature enabled for non-RISC-V target {}", target);
        return;
    }

    // Bootloader occupies the first 3KB of flash, see protocol::BOOTLOADER_SIZE
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    fs::copy("memory.x", out_dir.join("memory.x")).unwrap();
    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
}
