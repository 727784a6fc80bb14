/// Builds the gRPC client and server code for `schedulytics.proto` using
/// `tonic-prost-build`.
///
/// Emits the message types, the `HelloService` and `JobService` bindings, and
/// an encoded file descriptor set (`schedulytics_descriptor.bin`) consumed by
/// the reflection service. `google.protobuf.Empty` is mapped to `()` by prost.
///
/// # Panics
///
/// Panics if `protoc` is missing or code generation fails.
///
/// # Output
///
/// ```rust
/// pub mod proto {
///     tonic::include_proto!("schedulytics");
/// }
/// ```
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("schedulytics_descriptor.bin");

    println!("cargo:rerun-if-changed=proto/schedulytics.proto");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/schedulytics.proto"], &["proto"])
        .unwrap();
}
