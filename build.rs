//! Build script for generating the `quayside` man page.
//!
//! The page documents `quayside up` (substantiate a container and hold it
//! until Ctrl-C) and `quayside check` (print the configuration report). It
//! is rendered from the same `Cli` definition the binary parses, into
//! `$OUT_DIR/quayside.1`, for packaging to pick up.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir =
        PathBuf::from(env::var_os("OUT_DIR").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
        })?);

    let mut buffer = Vec::new();
    Man::new(Cli::command()).render(&mut buffer)?;

    let mut file = File::create(out_dir.join("quayside.1"))?;
    file.write_all(&buffer)?;

    Ok(())
}
