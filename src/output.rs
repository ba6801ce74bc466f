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

use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::debug;
use tempfile::NamedTempFile;

/// Platform-native line terminator; every line, the last included, ends with it.
pub const LINE_ENDING: &str = if cfg!(windows) { "\r\n" } else { "\n" };

/// `lines` joined into one document, each line terminated.
pub fn render<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line.as_ref());
        out.push_str(LINE_ENDING);
    }
    out
}

/// Write `lines` to `path`, replacing any previous file.
///
/// The content is staged in a temporary file next to `path` and renamed into
/// place, so readers never observe a half-written list.
pub fn write_signatures<S: AsRef<str>>(path: &Path, lines: &[S]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        writer.write_all(render(lines).as_bytes())?;
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    debug!("wrote {} lines to {}", lines.len(), path.display());
    Ok(())
}
