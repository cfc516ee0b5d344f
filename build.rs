// Compiles the quad shaders to SPIR-V when glslc is on the path.
// A missing compiler is not an error: the renderer loads .spv files at
// runtime, so prebuilt bytecode checked in or compiled by hand works too.

use std::path::Path;
use std::process::Command;

const SHADERS: [(&str, &str); 2] = [
    ("shaders/quad.vert", "shaders/quad.vert.spv"),
    ("shaders/quad.frag", "shaders/quad.frag.spv"),
];

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    for (source, bytecode) in SHADERS {
        compile_shader(source, bytecode);
    }
}

fn compile_shader(source: &str, bytecode: &str) {
    let status = Command::new("glslc")
        .arg(Path::new(source))
        .arg("-o")
        .arg(Path::new(bytecode))
        .status();

    match status {
        Ok(status) if status.success() => {
            println!("{} -> {}", source, bytecode);
        }
        Ok(status) => {
            // glslc ran and rejected the shader; that is a real error
            panic!("glslc failed on {} (exit code {:?})", source, status.code());
        }
        Err(e) => {
            eprintln!("warning: could not run glslc ({e}); skipping shader compilation");
            eprintln!("compile manually with: glslc {} -o {}", source, bytecode);
        }
    }
}
