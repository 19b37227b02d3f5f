use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_path = PathBuf::from("proto/gateway.proto");
    let proto_dir = proto_path
        .parent()
        .ok_or("proto file should reside in a directory")?;

    // Prefer a system protoc when one is configured.
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    println!("cargo:rerun-if-changed={}", proto_path.display());

    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(&[&proto_path], &[proto_dir])?;

    Ok(())
}
