//! Build script for tiltqd-nmpc
//!
//! With the `acados` feature, compiles the generated `tilt_qd_servo` solver
//! and links the ACADOS libraries.
//!
//! Prerequisites:
//! - ACADOS installed and ACADOS_SOURCE_DIR set
//! - Solver code generated into `generated/tilt_qd_servo`

fn main() {
    #[cfg(not(feature = "acados"))]
    println!("cargo:rerun-if-changed=build.rs");

    #[cfg(feature = "acados")]
    build_acados();
}

#[cfg(feature = "acados")]
fn c_sources(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "c").unwrap_or(false))
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(feature = "acados")]
fn build_acados() {
    use std::env;
    use std::path::PathBuf;

    println!("cargo:rerun-if-changed=generated/");
    println!("cargo:rerun-if-env-changed=ACADOS_SOURCE_DIR");

    let acados_dir = env::var("ACADOS_SOURCE_DIR").unwrap_or_else(|_| {
        if PathBuf::from("/opt/acados").exists() {
            "/opt/acados".to_string()
        } else {
            let home = env::var("HOME").unwrap_or_default();
            format!("{}/acados", home)
        }
    });
    let acados_path = PathBuf::from(&acados_dir);
    if !acados_path.exists() {
        println!("cargo:warning=ACADOS not found at {}", acados_dir);
        println!("cargo:warning=Set ACADOS_SOURCE_DIR environment variable");
        return;
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_default());
    let generated_dir = manifest_dir.join("generated").join("tilt_qd_servo");
    if !generated_dir.exists() {
        println!("cargo:warning=Generated ACADOS code not found at {:?}", generated_dir);
        return;
    }

    let mut build = cc::Build::new();
    build.include(acados_path.join("include"));
    build.include(acados_path.join("include/blasfeo/include"));
    build.include(acados_path.join("include/hpipm/include"));
    build.include(&generated_dir);

    let mut c_files = c_sources(&generated_dir);
    for sub in ["tilt_qd_servo_model", "tilt_qd_servo_cost"] {
        let dir = generated_dir.join(sub);
        if dir.exists() {
            build.include(&dir);
            c_files.extend(c_sources(&dir));
        }
    }

    if c_files.is_empty() {
        println!("cargo:warning=No C files found in {:?}", generated_dir);
        return;
    }
    for c_file in &c_files {
        build.file(c_file);
        println!("cargo:rerun-if-changed={}", c_file.display());
    }
    build.compile("tilt_qd_servo_acados");

    println!("cargo:rustc-link-search=native={}/lib", acados_dir);
    println!("cargo:rustc-link-lib=acados");
    println!("cargo:rustc-link-lib=blasfeo");
    println!("cargo:rustc-link-lib=hpipm");
    println!("cargo:rustc-link-lib=m");
}
