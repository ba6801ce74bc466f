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

//! Drives dump -> filter -> resolve -> assemble across many object files.
//!
//! Object files share nothing, so workers pull paths from a shared cursor and
//! send finished per-file results down a channel. Merging and sorting happen
//! once, after every worker is done, so output never depends on which file
//! finished first.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;

use log::{debug, info, warn};

use crate::dump::DumpSource;
use crate::entries::{CompilationUnit, Tag};
use crate::errors::SignatureError;
use crate::filter::SourcePathFilter;
use crate::resolve::TypeResolver;
use crate::signature::{assemble_with, FunctionSignature};

/// A non-fatal problem, tied to the object file (and entry) it came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Warning {
    pub object: PathBuf,
    pub offset: Option<u64>,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(off) => write!(
                f,
                "{} [0x{:08x}]: {}",
                self.object.display(),
                off,
                self.message
            ),
            None => write!(f, "{}: {}", self.object.display(), self.message),
        }
    }
}

/// Everything extracted from one object file.
#[derive(Debug, Default)]
pub struct FileResult {
    pub object: PathBuf,
    pub signatures: HashSet<FunctionSignature>,
    pub warnings: Vec<Warning>,
    pub skipped: usize,
    pub failed: bool,
}

/// Signatures of every first-party subprogram in one unit, plus the reasons
/// the others were skipped.
pub fn unit_signatures(
    unit: &CompilationUnit,
    filter: &SourcePathFilter,
) -> (Vec<FunctionSignature>, Vec<SignatureError>) {
    let mut resolver = TypeResolver::new(unit);
    let mut signatures = Vec::new();
    let mut errors = Vec::new();
    for idx in unit.indices_with_tag(&Tag::Subprogram) {
        if !filter.belongs(unit, idx) {
            continue;
        }
        match assemble_with(&mut resolver, idx) {
            Ok(sig) => signatures.push(sig),
            Err(e) => errors.push(e),
        }
    }
    (signatures, errors)
}

/// Run the whole per-file pipeline for one object file.
pub fn extract_object<S: DumpSource + ?Sized>(
    source: &S,
    filter: &SourcePathFilter,
    object: &Path,
) -> FileResult {
    let mut result = FileResult {
        object: object.to_path_buf(),
        ..FileResult::default()
    };

    let units = match source.dump(object) {
        Ok(units) => units,
        Err(e) => {
            warn!("{}: {}", object.display(), e);
            result.failed = true;
            result.warnings.push(Warning {
                object: object.to_path_buf(),
                offset: None,
                message: e.to_string(),
            });
            return result;
        }
    };

    for unit in &units {
        let (signatures, errors) = unit_signatures(unit, filter);
        result.signatures.extend(signatures);
        for e in errors {
            let offset = match &e {
                SignatureError::MissingLinkageName { offset }
                | SignatureError::Resolve { offset, .. } => *offset,
            };
            warn!("{} [0x{:08x}]: {}", object.display(), offset, e);
            result.skipped += 1;
            result.warnings.push(Warning {
                object: object.to_path_buf(),
                offset: Some(offset),
                message: e.to_string(),
            });
        }
    }
    debug!(
        "{}: {} units, {} signatures",
        object.display(),
        units.len(),
        result.signatures.len()
    );
    result
}

/// The merged outcome of a run.
#[derive(Debug, Default)]
pub struct Report {
    pub signatures: HashSet<FunctionSignature>,
    pub files_processed: usize,
    pub failed_files: usize,
    pub skipped_entries: usize,
    /// Sorted by object file, then entry offset
    pub warnings: Vec<Warning>,
    /// The run was aborted before every file was processed
    pub cancelled: bool,
}

impl Report {
    fn merge(results: Vec<FileResult>, cancelled: bool) -> Self {
        let mut report = Report {
            cancelled,
            ..Report::default()
        };
        for result in results {
            report.files_processed += 1;
            if result.failed {
                report.failed_files += 1;
            }
            report.skipped_entries += result.skipped;
            report.signatures.extend(result.signatures);
            report.warnings.extend(result.warnings);
        }
        report.warnings.sort();
        report
    }

    /// Canonical signature strings, sorted by their full text.
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.signatures.iter().map(|s| s.to_string()).collect();
        lines.sort();
        lines.dedup();
        lines
    }
}

pub struct Aggregator<S: DumpSource> {
    source: S,
    filter: SourcePathFilter,
    jobs: usize,
    cancel: Option<Arc<AtomicBool>>,
}

impl<S: DumpSource> Aggregator<S> {
    pub fn new(source: S, filter: SourcePathFilter) -> Self {
        Self {
            source,
            filter,
            jobs: 1,
            cancel: None,
        }
    }

    /// Upper bound on concurrently processed object files; 1 scans sequentially.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Once the flag is set no further object files are started.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    pub fn run(&self, objects: &[PathBuf]) -> Report {
        let now = Instant::now();
        let results = if self.jobs <= 1 || objects.len() <= 1 {
            self.run_sequential(objects)
        } else {
            self.run_parallel(objects)
        };
        let report = Report::merge(results, self.is_cancelled());
        info!(
            "Processed {} of {} object files in {:.2?}: {} signatures, {} failed files, {} skipped entries",
            report.files_processed,
            objects.len(),
            now.elapsed(),
            report.signatures.len(),
            report.failed_files,
            report.skipped_entries
        );
        if report.cancelled {
            warn!("run was cancelled; results are partial");
        }
        report
    }

    fn run_sequential(&self, objects: &[PathBuf]) -> Vec<FileResult> {
        let mut results = Vec::with_capacity(objects.len());
        for object in objects {
            if self.is_cancelled() {
                break;
            }
            results.push(extract_object(&self.source, &self.filter, object));
        }
        results
    }

    fn run_parallel(&self, objects: &[PathBuf]) -> Vec<FileResult> {
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<FileResult>();
        let workers = self.jobs.min(objects.len());
        debug!("starting {} workers for {} object files", workers, objects.len());

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || loop {
                    if self.is_cancelled() {
                        break;
                    }
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(object) = objects.get(i) else {
                        break;
                    };
                    if tx
                        .send(extract_object(&self.source, &self.filter, object))
                        .is_err()
                    {
                        break;
                    }
                });
            }
        });
        drop(tx);
        rx.into_iter().collect()
    }
}

/// Object files directly inside `dir` with the given extension, sorted.
pub fn collect_object_files(dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
    let wanted = extension.trim_start_matches('.');
    let mut objects = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == wanted) {
            objects.push(path);
        }
    }
    objects.sort();
    Ok(objects)
}
