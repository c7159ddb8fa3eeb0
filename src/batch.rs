//! Batch generation: one compiled SVG per CSV row plus an ink stats file.
//!
//! A project directory holds `input.csv` and `template.svg`. Output lands in
//! `generated_batch/`, which is wiped at the start of every run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::{info, instrument, warn};

use crate::error::{LinecraftError, Result};
use crate::glyph::FontRegistry;
use crate::template::{LayoutOffset, TemplateCompiler};

pub const INPUT_CSV: &str = "input.csv";
pub const TEMPLATE_SVG: &str = "template.svg";
pub const OUTPUT_DIR: &str = "generated_batch";
pub const STATS_FILE: &str = "batch_stats.json";

/// Field that receives the filled body template.
pub const BODY_FIELD: &str = "BODY";
pub const DEFAULT_BODY_TEMPLATE: &str = "Hi {NAME},\nYour order is ready.";

/// One table row: ordered field → value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataRow {
    fields: Vec<(String, String)>,
}

impl DataRow {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut row = Self::default();
        for (key, value) in pairs {
            row.insert(key, value);
        }
        row
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets `key`, keeping its original position if already present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Replaces every `{FIELD}` token in `template` with the row's value.
pub fn fill_body(template: &str, row: &DataRow) -> String {
    row.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{key}}}"), value)
    })
}

/// `NNN_<name>.svg`, 1-based and zero-padded to three digits.
pub fn output_filename(index: usize, row: &DataRow) -> String {
    let name: String = row
        .get("NAME")
        .unwrap_or("card")
        .chars()
        .map(|c| if c == ' ' || c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{:03}_{name}.svg", index + 1)
}

/// Ink used per job file, in meters rounded to 0.1 mm.
pub type BatchStats = BTreeMap<String, f64>;

pub fn mm_to_meters(mm: f64) -> f64 {
    (mm / 1000.0 * 10_000.0).round() / 10_000.0
}

/// Everything a batch run needs from the project.
#[derive(Debug, Clone)]
pub struct ProjectInputs {
    pub project_dir: PathBuf,
    pub font_name: String,
    pub body_template: Option<String>,
    pub offset: LayoutOffset,
}

impl ProjectInputs {
    pub fn new(project_dir: impl Into<PathBuf>, font_name: impl Into<String>) -> Self {
        Self {
            project_dir: project_dir.into(),
            font_name: font_name.into(),
            body_template: None,
            offset: LayoutOffset::default(),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.project_dir.join(OUTPUT_DIR)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub count: usize,
    pub output_dir: PathBuf,
    pub stats: BatchStats,
}

pub fn read_rows(csv_path: &Path) -> Result<Vec<DataRow>> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(DataRow::from_pairs(
            headers
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string)),
        ));
    }
    Ok(rows)
}

/// Drives the template compiler over every row of a project's table.
pub struct BatchGenerator<'a> {
    registry: &'a FontRegistry,
}

impl<'a> BatchGenerator<'a> {
    pub fn new(registry: &'a FontRegistry) -> Self {
        Self { registry }
    }

    /// Generates the whole batch.
    ///
    /// Font, template and table are loaded before the output directory is
    /// recreated, so a setup error keeps the previous batch. A failing row aborts the run;
    /// files written for earlier rows stay on disk and no stats file is
    /// written.
    #[instrument(skip_all, fields(project = %inputs.project_dir.display(), font = %inputs.font_name))]
    pub fn generate<R: Rng + ?Sized>(&self, inputs: &ProjectInputs, rng: &mut R) -> Result<BatchReport> {
        let csv_path = inputs.project_dir.join(INPUT_CSV);
        let template_path = inputs.project_dir.join(TEMPLATE_SVG);
        if !csv_path.is_file() {
            return Err(LinecraftError::Config(format!("{INPUT_CSV} missing")));
        }
        if !template_path.is_file() {
            return Err(LinecraftError::Config(format!("{TEMPLATE_SVG} missing")));
        }

        // Setup errors must leave the previous batch untouched.
        let library = self.registry.resolve(&inputs.font_name)?;
        let compiler = TemplateCompiler::new(&template_path, library, inputs.offset)?;
        let body_template = inputs
            .body_template
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_BODY_TEMPLATE);
        let rows = read_rows(&csv_path)?;

        let output_dir = inputs.output_dir();
        if output_dir.exists() {
            std::fs::remove_dir_all(&output_dir)?;
        }
        std::fs::create_dir_all(&output_dir)?;

        let mut stats = BatchStats::new();

        for (index, mut row) in rows.into_iter().enumerate() {
            let body = fill_body(body_template, &row);
            row.insert(BODY_FIELD, body);

            let filename = output_filename(index, &row);
            let compiled = compiler.compile(&row, rng).map_err(|e| {
                warn!(row = index + 1, error = %e, "row failed; aborting batch");
                e
            })?;
            compiled.document.write(&output_dir.join(&filename))?;
            stats.insert(filename, mm_to_meters(compiled.ink_length_mm));
        }

        let stats_json = serde_json::to_string_pretty(&stats)?;
        std::fs::write(output_dir.join(STATS_FILE), stats_json)?;

        info!(count = stats.len(), "batch generated");
        Ok(BatchReport {
            count: stats.len(),
            output_dir,
            stats,
        })
    }
}
