fn main() {
    build_marker();
}

// Cached game options older than this marker are refetched on first load.
fn build_marker() {
    let marker = chrono::Utc::now().to_rfc3339();
    println!("cargo:rustc-env=KOIN_TOSS_BUILD_TIME={marker}");
    println!("cargo:rerun-if-changed=src");
    println!("cargo:rerun-if-changed=build.rs");
}
