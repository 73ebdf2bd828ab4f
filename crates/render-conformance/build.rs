//! Renders the rule fixtures into `OUT_DIR` so the crate compiles them as
//! ordinary modules.

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Module name and fixture path relative to `crates/`.
const FIXTURES: &[(&str, &str)] = &[
    ("monitor", "core/tests/fixtures/monitor.rul"),
    ("dead", "core/tests/fixtures/dead.rul"),
    ("camera", "eval/tests/fixtures/camera.rul"),
];

fn main() {
    let manifest_dir = PathBuf::from(
        env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|e| panic!("CARGO_MANIFEST_DIR: {}", e)),
    );
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap_or_else(|e| panic!("OUT_DIR: {}", e)));
    let crates_dir = manifest_dir
        .parent()
        .unwrap_or_else(|| panic!("{} has no parent", manifest_dir.display()));

    let mut modules = String::new();
    for (name, rel) in FIXTURES {
        let source = crates_dir.join(rel);
        println!("cargo:rerun-if-changed={}", source.display());
        let out = render_to(&source, &out_dir.join(format!("{}.rs", name)));
        let _ = writeln!(modules, "#[path = {:?}]", out.display().to_string());
        let _ = writeln!(modules, "pub mod {};", name);
    }
    let index = out_dir.join("rendered.rs");
    fs::write(&index, modules).unwrap_or_else(|e| panic!("writing {}: {}", index.display(), e));
}

fn render_to(source: &Path, out: &Path) -> PathBuf {
    let program = rips_core::compile_file(source)
        .unwrap_or_else(|e| panic!("{} should compile:\n{}", source.display(), e));
    let text = rips_codegen::render(&program)
        .unwrap_or_else(|e| panic!("{} should render: {}", source.display(), e));
    fs::write(out, text).unwrap_or_else(|e| panic!("writing {}: {}", out.display(), e));
    out.to_path_buf()
}
