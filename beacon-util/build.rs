//! Compile time configurations for the util crate
fn main() {
    // BEACON_PKG_NAME names the folder created under `~/.config`. Changing
    // it orphans every cached device key and the stored cloud config, which
    // forces all devices to activate again.
    println!("cargo::rustc-env=BEACON_PKG_NAME=beacon");
}
