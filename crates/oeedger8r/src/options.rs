//! Command-line surface and warning-flag folding.

use anyhow::bail;
use clap::Parser;
use edger8r_types::{Warning, WarningPolicy, WarningState};
use std::path::PathBuf;

/// Generate edge routines from EDL interface definitions.
///
/// If neither `--untrusted` nor `--trusted` is specified, both sides are
/// generated.
#[derive(Parser, Debug)]
#[command(name = "oeedger8r", disable_version_flag = true)]
pub struct Options {
    /// Specify the search path of EDL files (repeatable)
    #[arg(long = "search-path", value_name = "path")]
    pub search_path: Vec<PathBuf>,

    /// Prefix untrusted proxy with the enclave name
    #[arg(long)]
    pub use_prefix: bool,

    /// Only generate header files
    #[arg(long)]
    pub header_only: bool,

    /// Generate untrusted proxy and bridge
    #[arg(long)]
    pub untrusted: bool,

    /// Generate trusted proxy and bridge
    #[arg(long)]
    pub trusted: bool,

    /// Specify the directory for saving untrusted code
    #[arg(long = "untrusted-dir", value_name = "dir")]
    pub untrusted_dir: Option<PathBuf>,

    /// Specify the directory for saving trusted code
    #[arg(long = "trusted-dir", value_name = "dir")]
    pub trusted_dir: Option<PathBuf>,

    /// Define a name for the EDL preprocessor (repeatable)
    #[arg(short = 'D', value_name = "name")]
    pub defines: Vec<String>,

    /// Warning options: -W<warning>, -Wno-<warning>, -Werror,
    /// -Werror=<warning>, -Wall
    #[arg(short = 'W', value_name = "warning")]
    pub warnings: Vec<String>,

    /// Enable experimental features
    #[arg(long)]
    pub experimental: bool,

    /// Input EDL files
    #[arg(value_name = "file", required = true)]
    pub files: Vec<PathBuf>,
}

/// Fold the `-W` option strings into a policy, later flags overriding
/// earlier ones only by promotion (`-Wno-` over `-Werror=` over `-W`).
pub fn fold_warnings(args: &[String]) -> anyhow::Result<WarningPolicy> {
    let mut policy = WarningPolicy::default();
    for arg in args {
        let (state, tag) = if let Some(tag) = arg.strip_prefix("no-") {
            (WarningState::Ignore, tag)
        } else if let Some(tag) = arg.strip_prefix("error=") {
            (WarningState::Error, tag)
        } else {
            (WarningState::Warning, arg.as_str())
        };

        let warning = match Warning::parse(tag) {
            Some(w) => w,
            None => bail!("unknown warning option '-W{arg}'"),
        };
        // -Werror=error and -Werror=all make no sense.
        if state == WarningState::Error && matches!(warning, Warning::Error | Warning::All) {
            bail!("invalid option '-W{arg}'");
        }
        policy.set(warning, state);
    }
    Ok(policy)
}
