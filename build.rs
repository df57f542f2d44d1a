use std::env;
use std::process::Command;

// Turns on the portable-SIMD ASCII scan when building with a nightly compiler.
fn main() {
    println!("cargo:rerun-if-env-changed=RUSTC");

    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let version = Command::new(rustc)
        .arg("--version")
        .output()
        .ok()
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .unwrap_or_default();

    if version.contains("-nightly") {
        println!("cargo:rustc-cfg=feature=\"simd\"");
    }
}
