//! clickcam Daemon - click detection and webcam relay server
//!
//! See [`clickcamd::cli`] for usage.

fn main() -> anyhow::Result<()> {
    clickcamd::cli::main()
}
