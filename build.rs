//! Compiles `proto/fetchproxy.proto` into Rust gRPC client/server code.
//!
//! Wiring grounded on `agent-xds`'s build script in the agentgateway pack
//! example, trimmed to the subset this crate needs (no well-known-types,
//! no JSON serialization support).

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(true)
        .build_client(false)
        .compile_protos(&["proto/fetchproxy.proto"], &["proto"])?;
    Ok(())
}
