use std::{env, fs, path::PathBuf};

fn main() {
    // Hand the right memory layout to the linker for embedded targets.
    let target = env::var("TARGET").unwrap_or_default();
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));

    let memory = if target.starts_with("thumbv8m") {
        Some("memory-pico2.x")
    } else if target.starts_with("thumbv6m") {
        Some("memory-pico1w.x")
    } else {
        None
    };

    if let Some(memory) = memory {
        let contents = fs::read_to_string(memory)
            .unwrap_or_else(|err| panic!("failed to read {memory}: {err}"));
        fs::write(out_dir.join("memory.x"), contents).expect("failed to write memory.x");
        println!("cargo:rustc-link-search={}", out_dir.display());
        println!("cargo:rerun-if-changed={memory}");
    }
}
