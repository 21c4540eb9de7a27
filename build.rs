fn main() {
    // Stamp the build time for `eventkit::BUILD_DATE`
    let built_at = chrono::Utc::now().format("%Y-%m-%d %H:%M UTC");
    println!("cargo:rustc-env=BUILD_DATE={}", built_at);
    println!("cargo:rerun-if-changed=build.rs");
}
