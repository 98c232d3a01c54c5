//! Archive rewriter
//!
//! Streams every entry of a zip archive in order. Class entries go through
//! each pass of a [`TransformPlan`], one after the other; every other entry,
//! and every class no pass changed, is copied raw without recompression.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};
use crate::visitor::{transform_class, Pass, PassReport};

const CLASS_SUFFIX: &str = ".class";

/// Upper bound on the buffer reserved from an entry's declared size
const MAX_PREALLOC: usize = 1 << 20;

/// Ordered passes applied to every class entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformPlan {
    passes: Vec<Pass>,
}

/// Result of running a plan over one class
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassOutcome {
    pub bytes: Vec<u8>,
    pub reports: Vec<PassReport>,
}

impl ClassOutcome {
    pub fn changed(&self) -> bool {
        self.reports.iter().any(PassReport::changed)
    }

    pub fn metadata_warnings(&self) -> usize {
        self.reports.iter().filter(|r| r.metadata_warning.is_some()).count()
    }
}

impl TransformPlan {
    pub fn new(passes: Vec<Pass>) -> Self {
        Self { passes }
    }

    /// One pass per pattern string, all with the same message
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S], message: &str) -> Result<Self> {
        let passes = patterns
            .iter()
            .map(|p| Pass::parse(p.as_ref(), message))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(passes))
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Run every pass over a class, each on the previous pass's output
    pub fn apply(&self, bytes: &[u8]) -> Result<ClassOutcome> {
        let mut current = bytes.to_vec();
        let mut reports = Vec::with_capacity(self.passes.len());
        for pass in &self.passes {
            let (next, report) = transform_class(&current, &pass.rules)?;
            current = next;
            reports.push(report);
        }
        Ok(ClassOutcome { bytes: current, reports })
    }
}

/// Summary of one archive rewrite
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub entries: usize,
    pub classes: usize,
    pub transformed: usize,
    pub metadata_warnings: usize,
    /// Class entries that could not be parsed and were copied as is
    pub skipped_malformed: usize,
}

fn prealloc_len(declared: u64) -> usize {
    usize::try_from(declared).map_or(MAX_PREALLOC, |len| len.min(MAX_PREALLOC))
}

fn is_class_entry(name: &str, is_dir: bool) -> bool {
    !is_dir && name.ends_with(CLASS_SUFFIX)
}

/// Rewrite `input` into `output`. Entry order, directory entries and the
/// bytes of unchanged entries are preserved.
pub fn rewrite_archive<R, W>(input: R, output: W, plan: &TransformPlan) -> Result<(W, ArchiveReport)>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let mut archive = ZipArchive::new(input)?;
    let mut writer = ZipWriter::new(output);
    let mut report = ArchiveReport::default();

    info!(entries = archive.len(), passes = plan.passes.len(), "rewriting archive");
    for (index, pass) in plan.passes.iter().enumerate() {
        info!(pass = index + 1, rules = pass.rules.len(), "pass: {}", pass.source.trim());
    }

    for index in 0..archive.len() {
        report.entries += 1;

        let (name, options, outcome) = {
            let mut entry = archive.by_index(index)?;
            let name = entry.name().to_string();
            if !is_class_entry(&name, entry.is_dir()) || plan.is_empty() {
                (name, None, None)
            } else {
                report.classes += 1;
                let mut bytes = Vec::with_capacity(prealloc_len(entry.size()));
                entry.read_to_end(&mut bytes)?;

                let method = match entry.compression() {
                    CompressionMethod::Stored => CompressionMethod::Stored,
                    _ => CompressionMethod::Deflated,
                };
                let mut options = SimpleFileOptions::default().compression_method(method);
                if let Some(modified) = entry.last_modified() {
                    options = options.last_modified_time(modified);
                }
                if let Some(mode) = entry.unix_mode() {
                    options = options.unix_permissions(mode);
                }

                let outcome = match plan.apply(&bytes) {
                    Ok(outcome) => Some(outcome),
                    Err(Error::ClassFormat(message)) => {
                        warn!(entry = %name, error = %message, "malformed class copied unchanged");
                        report.skipped_malformed += 1;
                        None
                    }
                    Err(err) => return Err(err),
                };
                (name, Some(options), outcome)
            }
        };

        match (options, outcome) {
            (Some(options), Some(outcome)) if outcome.changed() => {
                debug!(entry = %name, "transformed");
                report.transformed += 1;
                report.metadata_warnings += outcome.metadata_warnings();
                writer.start_file(name, options)?;
                writer.write_all(&outcome.bytes)?;
            }
            (_, outcome) => {
                if let Some(outcome) = outcome {
                    report.metadata_warnings += outcome.metadata_warnings();
                }
                writer.raw_copy_file(archive.by_index_raw(index)?)?;
            }
        }
    }

    let output = writer.finish()?;
    info!(
        entries = report.entries,
        transformed = report.transformed,
        metadata_warnings = report.metadata_warnings,
        "archive rewritten"
    );
    Ok((output, report))
}

/// Rewrite an archive on disk
pub fn rewrite_archive_file(input: &Path, output: &Path, plan: &TransformPlan) -> Result<ArchiveReport> {
    let reader = BufReader::new(File::open(input)?);
    let writer = BufWriter::new(File::create(output)?);
    let (mut writer, report) = rewrite_archive(reader, writer, plan)?;
    writer.flush()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::classfile::{access, ClassFileBuilder};

    fn plan(patterns: &[&str]) -> TransformPlan {
        TransformPlan::from_patterns(patterns, "gone").unwrap()
    }

    fn target_class() -> Vec<u8> {
        ClassFileBuilder::new("dir/Target")
            .method(access::PUBLIC, "run", "()V")
            .build()
            .unwrap()
            .to_bytes()
    }

    fn archive(entries: &[(&str, Option<&[u8]>)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            match data {
                None => writer.add_directory(*name, SimpleFileOptions::default()).unwrap(),
                Some(data) => {
                    writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                    writer.write_all(data).unwrap();
                }
            }
        }
        writer.finish().unwrap().into_inner()
    }

    fn read_entries(bytes: Vec<u8>) -> Vec<(String, bool, Vec<u8>)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut entry = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                (entry.name().to_string(), entry.is_dir(), data)
            })
            .collect()
    }

    #[test]
    fn test_declared_size_does_not_drive_allocation() {
        assert_eq!(prealloc_len(512), 512);
        assert_eq!(prealloc_len(u64::MAX), MAX_PREALLOC);
        assert_eq!(prealloc_len(u32::MAX as u64), MAX_PREALLOC);
    }

    #[test]
    fn test_entry_order_and_untouched_bytes() {
        let class = target_class();
        let input = archive(&[
            ("dir/", None),
            ("dir/Target.class", Some(&class[..])),
            ("dir/readme.txt", Some(&b"hello"[..])),
        ]);
        let (output, report) =
            rewrite_archive(Cursor::new(input), Cursor::new(Vec::new()), &plan(&["class dir.Target"])).unwrap();

        assert_eq!(report.entries, 3);
        assert_eq!(report.classes, 1);
        assert_eq!(report.transformed, 1);

        let entries = read_entries(output.into_inner());
        let names: Vec<_> = entries.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, ["dir/", "dir/Target.class", "dir/readme.txt"]);
        assert!(entries[0].1);
        assert_ne!(entries[1].2, class);
        assert_eq!(entries[2].2, b"hello");
    }

    #[test]
    fn test_unmatched_archive_copies_classes_verbatim() {
        let class = target_class();
        let input = archive(&[("dir/Target.class", Some(&class[..]))]);
        let (output, report) =
            rewrite_archive(Cursor::new(input), Cursor::new(Vec::new()), &plan(&["class other.**"])).unwrap();
        assert_eq!(report.transformed, 0);
        assert_eq!(read_entries(output.into_inner())[0].2, class);
    }

    #[test]
    fn test_malformed_class_is_copied() {
        let input = archive(&[("Broken.class", Some(&b"\xCA\xFE\xBA\xBE\x00"[..]))]);
        let (output, report) =
            rewrite_archive(Cursor::new(input), Cursor::new(Vec::new()), &plan(&["class **"])).unwrap();
        assert_eq!(report.skipped_malformed, 1);
        assert_eq!(read_entries(output.into_inner())[0].2, b"\xCA\xFE\xBA\xBE\x00");
    }

    #[test]
    fn test_passes_are_chained() {
        let plan = plan(&["class dir.Target { *** run(); }", "class dir.Target"]);
        let outcome = plan.apply(&target_class()).unwrap();
        assert_eq!(outcome.reports.len(), 2);
        assert_eq!(outcome.reports[0].methods_deprecated, 1);
        assert!(outcome.reports[1].class_deprecated);
        assert!(outcome.changed());
    }
}
