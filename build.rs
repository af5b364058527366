use std::env;
use std::path::PathBuf;
use std::process::Command;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let target = env::var("TARGET").unwrap();

    // Only the bare-metal ARMv7 build has a boot stub and a linker script
    if target.starts_with("armv7a") {
        let status = Command::new("clang")
            .args(["-target", "armv7a-none-eabi", "-mcpu=cortex-a9", "-c", "src/boot.s", "-o"])
            .arg(out_dir.join("boot.o"))
            .status()
            .expect("Failed to assemble boot.s");

        if !status.success() {
            panic!("Assembly failed");
        }

        let status = Command::new("ar")
            .args(["crs"])
            .arg(out_dir.join("libboot.a"))
            .arg(out_dir.join("boot.o"))
            .status()
            .expect("Failed to create libboot.a");

        if !status.success() {
            panic!("Failed to create archive");
        }

        println!("cargo:rustc-link-search=native={}", out_dir.display());
        println!("cargo:rustc-link-lib=static:+whole-archive=boot");
        println!("cargo:rustc-link-arg-bins=-Tlinker.ld");
    }

    println!("cargo:rerun-if-changed=src/boot.s");
    println!("cargo:rerun-if-changed=linker.ld");
}
