use std::env;

fn main() {
    // Wi-Fi credentials and OTA secrets come from `.env` when present.
    if let Err(err) = dotenv_build::output(dotenv_build::Config::default()) {
        println!("cargo:warning=failed to load .env: {err}");
    }

    let version = env::var("BUILD_VERSION")
        .unwrap_or_else(|_| env::var("CARGO_PKG_VERSION").unwrap_or_default());
    println!("cargo:rustc-env=BUILD_VERSION={version}");
    println!(
        "cargo:rustc-env=BUILD_TIMESTAMP={}",
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    );

    println!("cargo:rerun-if-env-changed=BUILD_VERSION");
    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
