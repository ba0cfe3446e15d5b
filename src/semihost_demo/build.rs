use std::env;

fn main() {
    // `semihost_runner` puts the generated `memory.x` in this directory
    println!("cargo:rerun-if-env-changed=SEMIHOST_DEMO_LINK_SEARCH");
    if let Ok(link_search) = env::var("SEMIHOST_DEMO_LINK_SEARCH") {
        println!("cargo:rustc-link-search={}", link_search);
    }
}
