fn main() {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    // Symbols are only unmangled without debug assertions; the export list
    // would name undefined symbols otherwise.
    let exports_unmangled = std::env::var_os("CARGO_CFG_DEBUG_ASSERTIONS").is_none();
    let version_script = format!("{manifest_dir}/version_scripts/pagemalloc.map");
    if target_os == "linux" && exports_unmangled && std::path::Path::new(&version_script).exists()
    {
        println!("cargo:rustc-cdylib-link-arg=-Wl,--version-script={version_script}");
    }
    println!("cargo:rerun-if-changed=version_scripts/pagemalloc.map");
}
