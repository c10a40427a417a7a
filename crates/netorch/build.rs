use std::fs;
use std::path::{Path, PathBuf};

use clap::CommandFactory;

// cli.rs only depends on clap and clap_complete, both build-dependencies.
#[path = "src/cli.rs"]
mod cli;

fn main() {
    println!("cargo::rerun-if-changed=src/cli.rs");

    let out_dir: PathBuf = std::env::var_os("OUT_DIR")
        .expect("OUT_DIR not set by Cargo")
        .into();
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("failed to create man output directory");

    write_pages(cli::Cli::command(), &man_dir);
}

/// One page per visible command, named `netorch-<sub>-<subsub>.1`.
fn write_pages(root: clap::Command, dir: &Path) {
    let mut pending = vec![root];
    while let Some(cmd) = pending.pop() {
        let name = cmd.get_name().to_owned();
        for sub in cmd.get_subcommands().filter(|s| !s.is_hide_set()) {
            pending.push(sub.clone().name(format!("{name}-{}", sub.get_name())));
        }

        let mut buf = Vec::new();
        clap_mangen::Man::new(cmd)
            .render(&mut buf)
            .unwrap_or_else(|e| panic!("failed to render man page for `{name}`: {e}"));
        let path = dir.join(format!("{name}.1"));
        fs::write(&path, buf).unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
    }
}
