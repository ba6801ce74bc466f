// Copyright (c) 2026 DWARF-Sig-Helper Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};

use dwarf_sig_helper::aggregate::{collect_object_files, Aggregator, Report};
use dwarf_sig_helper::dump::{DumpEncoding, DumpSource, NativeReader, ToolDumper};
use dwarf_sig_helper::filter::SourcePathFilter;
use dwarf_sig_helper::{logging, output};

/// Extract the signatures of first-party functions from the debug info of a
/// directory of object files.
#[derive(Parser, Debug)]
#[command(name = "dwarf-sig-helper")]
#[command(version)]
#[command(about = "Extract first-party function signatures from DWARF debug info", long_about = None)]
struct Cli {
    /// Only functions declared in files under this path prefix are kept
    #[arg(long = "source-prefix")]
    source_prefix: String,

    /// Directory holding the object files (not searched recursively)
    #[arg(long = "objects")]
    objects: PathBuf,

    /// Extension of the object files to scan
    #[arg(long = "extension", default_value = "o")]
    extension: String,

    /// Where to write the sorted signature list
    #[arg(short = 'o', long = "output", default_value = "function_signatures.txt")]
    output: PathBuf,

    /// Number of object files processed at once (default: available cores)
    #[arg(short = 'j', long = "jobs")]
    jobs: Option<NonZeroUsize>,

    /// Program that dumps an object file's debug info
    #[arg(long = "dumper", default_value = dwarf_sig_helper::dump::tool::DEFAULT_DUMPER)]
    dumper: String,

    /// Argument passed to the dumper before the object path (repeatable)
    #[arg(long = "dumper-arg", allow_hyphen_values = true, default_values_t = default_dumper_args())]
    dumper_args: Vec<String>,

    /// Encoding of the dumper's output
    #[arg(long = "format", value_enum, default_value_t = DumpEncoding::Text)]
    format: DumpEncoding,

    /// Read DWARF in-process instead of running the dumper
    #[arg(long = "native", default_value_t = false)]
    native: bool,

    /// Enable debug output
    #[arg(short = 'd', long = "debug", default_value_t = false)]
    debug: bool,
}

fn default_dumper_args() -> Vec<String> {
    dwarf_sig_helper::dump::tool::DEFAULT_DUMPER_ARGS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn scan<S: DumpSource>(source: S, filter: SourcePathFilter, jobs: usize, objects: &[PathBuf]) -> Report {
    Aggregator::new(source, filter).with_jobs(jobs).run(objects)
}

fn object_files(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let dir = match dunce::canonicalize(dir) {
        Ok(dir) => dir,
        Err(e) => {
            warn!("cannot open object directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };
    match collect_object_files(&dir, extension) {
        Ok(files) => files,
        Err(e) => {
            warn!("cannot list object directory {}: {}", dir.display(), e);
            Vec::new()
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logger = logging::init(cli.debug).context("failed to initialize logging")?;
    debug!("{:?}", cli);

    let objects = object_files(&cli.objects, &cli.extension);
    info!(
        "Scanning {} object files in {} for functions under {}",
        objects.len(),
        cli.objects.display(),
        cli.source_prefix
    );

    let jobs = cli
        .jobs
        .or_else(|| thread::available_parallelism().ok())
        .map_or(1, NonZeroUsize::get);
    let filter = SourcePathFilter::new(cli.source_prefix.clone());

    let report = if cli.native {
        scan(NativeReader, filter, jobs, &objects)
    } else {
        let dumper = ToolDumper::new(cli.dumper.clone(), cli.dumper_args.clone(), cli.format);
        scan(dumper, filter, jobs, &objects)
    };

    let lines = report.lines();
    output::write_signatures(&cli.output, &lines)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;

    println!(
        "Wrote {} functions to {} ({} object files failed)",
        lines.len(),
        cli.output.display(),
        report.failed_files
    );
    Ok(())
}
