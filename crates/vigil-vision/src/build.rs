fn main() {
    // Cargo exposes enabled features to build scripts as CARGO_FEATURE_* env vars.
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_VISION_TFLITE");
    if std::env::var_os("CARGO_FEATURE_VISION_TFLITE").is_some() {
        println!("cargo:rustc-link-lib=tensorflowlite_c");
    }
    // Coral delegate is resolved by the #[link] attribute in tflite.rs when vision-coral is on.
}
