fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(true)
        // The node links this crate as a library for the client stubs.
        .build_client(true)
        .compile_protos(&["proto/engine.proto"], &["proto"])?;
    Ok(())
}
