//! The oeedger8r binary: parses each input EDL file and emits the
//! trusted/untrusted marshalling code into the configured directories.

mod options;

use anyhow::Context;
use clap::Parser;
use edger8r_parser::ParseContext;
use options::Options;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let options = match Options::try_parse() {
        Ok(options) => options,
        Err(e) => {
            // Usage errors (and --help) exit with status 1.
            let _ = e.print();
            std::process::exit(1);
        }
    };

    if let Err(e) = run(options) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn ensure_directory(dir: &Path) -> anyhow::Result<()> {
    if dir != Path::new(".") {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create output directory {}", dir.display()))?;
    }
    Ok(())
}

fn run(options: Options) -> anyhow::Result<()> {
    let policy = options::fold_warnings(&options.warnings)?;

    println!("Generating edge routine, for the Open Enclave SDK.");

    // Absence of both side flags means emit both.
    let (gen_trusted, gen_untrusted) = if !options.trusted && !options.untrusted {
        (true, true)
    } else {
        (options.trusted, options.untrusted)
    };

    let trusted_dir = options.trusted_dir.unwrap_or_else(|| PathBuf::from("."));
    let untrusted_dir = options.untrusted_dir.unwrap_or_else(|| PathBuf::from("."));
    if gen_trusted {
        ensure_directory(&trusted_dir)?;
    }
    if gen_untrusted {
        ensure_directory(&untrusted_dir)?;
    }

    let mut ctx = ParseContext::new(
        options.search_path,
        options.defines,
        policy,
        options.experimental,
    );

    for file in &options.files {
        let edl = edger8r_parser::parse_file(file, &mut ctx)?;
        let mut report = edger8r_emit::GenerationReport::new(&edl.name);

        if gen_trusted {
            report.extend(edger8r_emit::emit_trusted(
                &edl,
                &trusted_dir,
                options.header_only,
            )?);
        }
        if gen_untrusted {
            let prefix = if options.use_prefix {
                format!("{}_", edl.name)
            } else {
                String::new()
            };
            report.extend(edger8r_emit::emit_untrusted(
                &edl,
                &untrusted_dir,
                &prefix,
                options.header_only,
            )?);
        }

        if let Ok(json) = serde_json::to_string(&report) {
            tracing::debug!("generated {json}");
        }
    }

    println!("Success.");
    Ok(())
}
