fn main() {
    // FFI scaffolding comes from the setup_scaffolding!() proc-macro in
    // src/uniffi_bindings.rs; there is no UDL file to generate from.
    println!("cargo:rerun-if-changed=src/uniffi_bindings.rs");
    println!("cargo:rerun-if-changed=build.rs");
}
