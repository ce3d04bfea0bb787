use std::env;
use std::path::PathBuf;

fn main() {
    embuild::espidf::sysenv::output();

    // Model flatbuffer baked into the image. Override with GESTURECAM_MODEL.
    println!("cargo:rerun-if-env-changed=GESTURECAM_MODEL");
    let model = env::var_os("GESTURECAM_MODEL")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            PathBuf::from(env::var_os("CARGO_MANIFEST_DIR").unwrap_or_default())
                .join("model")
                .join("gesture_model.tflite")
        });
    println!("cargo:rerun-if-changed={}", model.display());
    println!("cargo:rustc-env=GESTURECAM_MODEL_PATH={}", model.display());
}
