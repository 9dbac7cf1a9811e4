//! Layer background removal CLI tool
//!
//! Command-line interface that removes image backgrounds through rembg and
//! composites the cutout back into the document.

#[cfg(feature = "cli")]
use layer_bgremove::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
