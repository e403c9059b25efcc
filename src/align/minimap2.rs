//! `minimap2`-backed [`Mapper`].
//!
//! Each batch is written to a temporary FASTA file and aligned with one
//! `minimap2` run whose PAF output is read from stdout.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::paf::parse_paf;
use super::{AlignError, Alignment, Mapper, TargetIsoforms};

pub const DEFAULT_EXECUTABLE: &str = "minimap2";

/// Options passed before the target and query files.
///
/// `--for-only` keeps every alignment on the forward strand and
/// `--cs=long` emits the difference string used for mutation calling.
pub const DEFAULT_OPTIONS: &[&str] = &[
    "-x",
    "map-pb",
    "-c",
    "--for-only",
    "--secondary=yes",
    "--cs=long",
];

/// Aligns batches of queries against a fixed target FASTA
#[derive(Debug, Clone)]
pub struct Minimap2 {
    executable: PathBuf,
    targets: PathBuf,
    options: Vec<String>,
    isoforms: TargetIsoforms,
}

impl Minimap2 {
    pub fn new(targets: impl Into<PathBuf>) -> Self {
        Self {
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            targets: targets.into(),
            options: DEFAULT_OPTIONS.iter().map(ToString::to_string).collect(),
            isoforms: TargetIsoforms::new(),
        }
    }

    #[must_use]
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_isoforms(mut self, isoforms: TargetIsoforms) -> Self {
        self.isoforms = isoforms;
        self
    }

    #[must_use]
    pub fn targets(&self) -> &Path {
        &self.targets
    }

    /// Run the aligner on a query FASTA and return its PAF output
    fn run(&self, queries: &Path) -> Result<Vec<u8>, AlignError> {
        let output = Command::new(&self.executable)
            .args(&self.options)
            .arg(&self.targets)
            .arg(queries)
            .output()
            .map_err(|source| AlignError::Spawn {
                program: self.executable.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(AlignError::AlignerFailed {
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok(output.stdout)
    }
}

/// Write queries as FASTA records
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_fasta<W: Write>(writer: W, queries: &[(String, String)]) -> std::io::Result<()> {
    let mut writer = BufWriter::new(writer);
    for (id, sequence) in queries {
        writeln!(writer, ">{id}")?;
        writeln!(writer, "{sequence}")?;
    }
    writer.flush()
}

impl Mapper for Minimap2 {
    fn map(
        &self,
        queries: &[(String, String)],
        audit: Option<&Path>,
    ) -> Result<HashMap<String, Alignment>, AlignError> {
        if queries.is_empty() {
            debug!("No queries to align");
            if let Some(path) = audit {
                File::create(path)?;
            }
            return Ok(HashMap::new());
        }

        let mut query_file = NamedTempFile::new()?;
        write_fasta(query_file.as_file_mut(), queries)?;

        debug!(
            queries = queries.len(),
            targets = %self.targets.display(),
            "Running minimap2"
        );
        let paf = self.run(query_file.path())?;

        if let Some(path) = audit {
            std::fs::write(path, &paf)?;
        }

        let alignments = parse_paf(paf.as_slice())?;
        info!(
            queries = queries.len(),
            aligned = alignments.len(),
            "Aligned batch"
        );
        Ok(alignments)
    }

    fn target_isoforms(&self) -> &TargetIsoforms {
        &self.isoforms
    }
}
