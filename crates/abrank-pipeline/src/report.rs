//! Report export: ranked CSV, full JSON report and shortlist FASTA.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use abrank_common::VariantId;
use abrank_ranker::{RankedCandidate, ShortlistEntry};

use crate::pipeline::{PipelineReport, VariantRecords};

/// Residues per FASTA sequence line.
const FASTA_LINE_WIDTH: usize = 60;

/// One row of the ranked CSV export.
#[derive(Debug, Serialize)]
struct RankedRow<'a> {
    final_rank: usize,
    variant_id: &'a str,
    final_score: f64,
    cds: f64,
    cds_rank: usize,
    docking_confidence: Option<f64>,
    docking_rank: f64,
    docking_source: &'static str,
}

impl<'a> From<&'a RankedCandidate> for RankedRow<'a> {
    fn from(c: &'a RankedCandidate) -> Self {
        Self {
            final_rank: c.final_rank,
            variant_id: c.variant_id.as_str(),
            final_score: c.final_score,
            cds: c.cds,
            cds_rank: c.cds_rank,
            docking_confidence: c.docking_confidence,
            docking_rank: c.docking_rank,
            docking_source: c.docking_source.as_str(),
        }
    }
}

/// Write the ranked list as CSV, best candidate first. A missing docking
/// confidence is written as an empty field.
pub fn write_ranked_csv<W: Write>(ranked: &[RankedCandidate], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for candidate in ranked {
        wtr.serialize(RankedRow::from(candidate))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_report_json<W: Write>(report: &PipelineReport, writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, report)?;
    Ok(())
}

/// Write the shortlisted sequences as FASTA, in shortlist order.
///
/// Header: `>id rank=N bucket=B parent=P generation=G`, with `parent=-` for
/// a root variant.
pub fn write_shortlist_fasta<W: Write>(
    shortlist: &[ShortlistEntry],
    variants: &[VariantRecords],
    mut writer: W,
) -> Result<()> {
    let by_id: BTreeMap<&VariantId, &VariantRecords> =
        variants.iter().map(|r| (&r.variant_id, r)).collect();

    for entry in shortlist {
        let record = by_id
            .get(&entry.variant_id)
            .with_context(|| format!("no records for shortlisted variant {}", entry.variant_id))?;
        writeln!(
            writer,
            ">{} rank={} bucket={} parent={} generation={}",
            entry.variant_id,
            entry.final_rank,
            entry.bucket,
            record.parent.as_ref().map_or("-", |p| p.as_str()),
            record.generation
        )?;
        for line in record.sequence.as_bytes().chunks(FASTA_LINE_WIDTH) {
            writer.write_all(line)?;
            writer.write_all(b"\n")?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Files written by [`write_report`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPaths {
    pub ranked_csv: PathBuf,
    pub report_json: PathBuf,
    /// None when the shortlist is empty.
    pub shortlist_fasta: Option<PathBuf>,
}

/// Write `<prefix>.ranked.csv`, `<prefix>.report.json` and, when anything was
/// shortlisted, `<prefix>.shortlist.fasta`.
pub fn write_report(report: &PipelineReport, prefix: &str) -> Result<ReportPaths> {
    let csv_path = PathBuf::from(format!("{prefix}.ranked.csv"));
    let json_path = PathBuf::from(format!("{prefix}.report.json"));

    write_ranked_csv(&report.ranked, BufWriter::new(create(&csv_path)?))
        .with_context(|| format!("writing {}", csv_path.display()))?;
    write_report_json(report, BufWriter::new(create(&json_path)?))
        .with_context(|| format!("writing {}", json_path.display()))?;

    let fasta_path = if report.shortlist.is_empty() {
        None
    } else {
        let path = PathBuf::from(format!("{prefix}.shortlist.fasta"));
        write_shortlist_fasta(&report.shortlist, &report.variants, BufWriter::new(create(&path)?))
            .with_context(|| format!("writing {}", path.display()))?;
        Some(path)
    };

    info!(
        csv = %csv_path.display(),
        json = %json_path.display(),
        ranked = report.ranked.len(),
        shortlisted = report.shortlist.len(),
        "Report written"
    );
    Ok(ReportPaths {
        ranked_csv: csv_path,
        report_json: json_path,
        shortlist_fasta: fasta_path,
    })
}

fn create(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("creating {}", path.display()))
}
