// build.rs
// Compiles the GLSL sources in resources/shaders to SPIR-V with glslc

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_STAGES: [&str; 2] = ["vert", "frag"];

/// `triangle.vert` -> `triangle_vert.spv`
fn output_name(source: &Path) -> Option<String> {
    let stem = source.file_stem()?.to_str()?;
    let ext = source.extension()?.to_str()?;
    SHADER_STAGES
        .contains(&ext)
        .then(|| format!("{stem}_{ext}.spv"))
}

fn is_stale(source: &Path, output: &Path) -> bool {
    match (
        std::fs::metadata(source).and_then(|m| m.modified()),
        std::fs::metadata(output).and_then(|m| m.modified()),
    ) {
        (Ok(src), Ok(dst)) => src > dst,
        _ => true,
    }
}

fn main() {
    println!("cargo:rerun-if-changed=../../resources/shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        eprintln!("hint: Install Vulkan SDK and set VULKAN_SDK environment variable");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        format!("{vulkan_sdk}\\Bin\\glslc.exe")
    } else {
        format!("{vulkan_sdk}/bin/glslc")
    };

    if !Path::new(&glslc).exists() {
        eprintln!("error: glslc not found at: {glslc}");
        eprintln!("hint: Ensure Vulkan SDK is properly installed");
        panic!("Shader compiler not found");
    }

    let shader_dir = PathBuf::from("../../resources/shaders");
    let target_dir = PathBuf::from("../../target/shaders");

    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        eprintln!("warning: Failed to create target directory: {e}");
        return;
    }

    let Ok(entries) = std::fs::read_dir(&shader_dir) else {
        eprintln!("info: No shader directory found at: {}", shader_dir.display());
        return;
    };

    let mut compiled_count = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = output_name(&path) else {
            continue;
        };
        let out_file = target_dir.join(name);

        if !is_stale(&path, &out_file) {
            eprintln!("info: Shader {} is up to date", path.display());
            continue;
        }

        match Command::new(&glslc).arg(&path).arg("-o").arg(&out_file).status() {
            Ok(s) if s.success() => {
                eprintln!("info: Compiled {} -> {}", path.display(), out_file.display());
                compiled_count += 1;
            }
            Ok(s) => {
                eprintln!("error: glslc failed for {} with exit code: {}", path.display(), s.code().unwrap_or(-1));
                panic!("Shader compilation failed");
            }
            Err(e) => {
                eprintln!("error: Failed to run glslc for {}: {e}", path.display());
                panic!("Failed to execute shader compiler");
            }
        }
    }

    eprintln!("info: Compiled {compiled_count} shader(s)");
}
