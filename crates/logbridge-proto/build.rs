//! Build script for gRPC wire code generation.
//!
//! Generates message types plus client and server code for the log stream
//! service from proto/logstream.proto using tonic-build.

fn main() {
    let protos = ["proto/logstream.proto"];

    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(&protos, &["proto"])
        .expect("Failed to compile protos");

    for proto in &protos {
        println!("cargo:rerun-if-changed={proto}");
    }
}
