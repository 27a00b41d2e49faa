//! Effect-allele alignment of exposure and outcome summary statistics.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, info};

use crate::config::MrConfig;
use crate::error::{MrError, Result};
use crate::qc::check_range_f64;
use crate::types::{HarmonizedTable, HarmonizedVariant, SummaryRecord};
use crate::utils::{complement, is_strand_ambiguous};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    NotInOutcome,
    DuplicateId,
    InvalidStatistics,
    PalindromicAmbiguous,
    AlleleMismatch,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DropReason::NotInOutcome => "not in outcome",
            DropReason::DuplicateId => "duplicate id",
            DropReason::InvalidStatistics => "invalid statistics",
            DropReason::PalindromicAmbiguous => "palindromic, ambiguous",
            DropReason::AlleleMismatch => "allele mismatch",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedVariant {
    pub id: String,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarmonizationReport {
    pub n_exposure: usize,
    pub n_outcome: usize,
    pub n_joined: usize,
    pub n_kept: usize,
    pub n_flipped: usize,
    pub n_strand_flipped: usize,
    pub n_palindromic_resolved: usize,
    pub dropped: Vec<DroppedVariant>,
}

impl HarmonizationReport {
    pub fn count(&self, reason: DropReason) -> usize {
        self.dropped.iter().filter(|d| d.reason == reason).count()
    }

    /// Variants dropped because their alleles could not be reconciled.
    pub fn unresolvable(&self) -> impl Iterator<Item = &DroppedVariant> {
        self.dropped.iter().filter(|d| {
            matches!(
                d.reason,
                DropReason::PalindromicAmbiguous | DropReason::AlleleMismatch
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Harmonized {
    pub table: HarmonizedTable,
    pub report: HarmonizationReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Alignment {
    Same,
    Swapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Keep { flip: bool, strand: bool },
    Drop(DropReason),
}

pub fn harmonize(
    exposure: &[SummaryRecord],
    outcome: &[SummaryRecord],
    config: &MrConfig,
) -> Result<Harmonized> {
    check_range_f64(config.palindrome_threshold, 0.0, 0.5, true, "palindrome_threshold")?;

    let mut report = HarmonizationReport {
        n_exposure: exposure.len(),
        n_outcome: outcome.len(),
        ..Default::default()
    };

    let mut outcome_by_id: HashMap<&str, &SummaryRecord> = HashMap::with_capacity(outcome.len());
    for rec in outcome {
        outcome_by_id.entry(rec.id.as_str()).or_insert(rec);
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(exposure.len());
    let mut variants = Vec::new();

    for exp in exposure {
        if !seen.insert(exp.id.as_str()) {
            report.dropped.push(dropped(exp, DropReason::DuplicateId));
            continue;
        }
        let Some(out) = outcome_by_id.get(exp.id.as_str()) else {
            report.dropped.push(dropped(exp, DropReason::NotInOutcome));
            continue;
        };
        report.n_joined += 1;

        if !valid_statistics(exp, out) {
            report.dropped.push(dropped(exp, DropReason::InvalidStatistics));
            continue;
        }

        match resolve(exp, out, config.palindrome_threshold) {
            Resolution::Keep { flip, strand } => {
                if flip {
                    report.n_flipped += 1;
                }
                if strand {
                    report.n_strand_flipped += 1;
                }
                if is_strand_ambiguous(&upper(&exp.effect_allele), &upper(&exp.other_allele)) {
                    report.n_palindromic_resolved += 1;
                }
                variants.push(align(exp, out, flip));
            }
            Resolution::Drop(reason) => {
                debug!("dropping {} ({reason})", exp.id);
                report.dropped.push(dropped(exp, reason));
            }
        }
    }

    report.n_kept = variants.len();
    info!(
        "Harmonized {} of {} exposure variants ({} joined, {} flipped, {} palindromic ambiguous, {} allele mismatch)",
        report.n_kept,
        report.n_exposure,
        report.n_joined,
        report.n_flipped,
        report.count(DropReason::PalindromicAmbiguous),
        report.count(DropReason::AlleleMismatch),
    );

    if variants.is_empty() {
        return Err(MrError::InsufficientInstruments {
            method: "harmonization",
            required: 1,
            found: 0,
        });
    }

    Ok(Harmonized {
        table: HarmonizedTable::from_variants(variants),
        report,
    })
}

fn dropped(rec: &SummaryRecord, reason: DropReason) -> DroppedVariant {
    DroppedVariant {
        id: rec.id.clone(),
        reason,
    }
}

fn valid_statistics(exp: &SummaryRecord, out: &SummaryRecord) -> bool {
    exp.beta.is_finite()
        && exp.se.is_finite()
        && out.beta.is_finite()
        && out.se.is_finite()
        && exp.se > 0.0
        && out.se >= 0.0
}

fn upper(allele: &str) -> String {
    allele.trim().to_ascii_uppercase()
}

fn alignment(a1: &str, a2: &str, b1: &str, b2: &str) -> Option<Alignment> {
    if a1 == b1 && a2 == b2 {
        Some(Alignment::Same)
    } else if a1 == b2 && a2 == b1 {
        Some(Alignment::Swapped)
    } else {
        None
    }
}

fn resolve(exp: &SummaryRecord, out: &SummaryRecord, threshold: f64) -> Resolution {
    let a1 = upper(&exp.effect_allele);
    let a2 = upper(&exp.other_allele);
    let b1 = upper(&out.effect_allele);
    let b2 = upper(&out.other_allele);

    if is_strand_ambiguous(&a1, &a2) {
        return resolve_palindromic(exp, out, &a1, &a2, &b1, &b2, threshold);
    }

    if let Some(al) = alignment(&a1, &a2, &b1, &b2) {
        return Resolution::Keep {
            flip: al == Alignment::Swapped,
            strand: false,
        };
    }

    let (Some(c1), Some(c2)) = (complement(&b1), complement(&b2)) else {
        return Resolution::Drop(DropReason::AlleleMismatch);
    };
    match alignment(&a1, &a2, &c1, &c2) {
        Some(al) => Resolution::Keep {
            flip: al == Alignment::Swapped,
            strand: true,
        },
        None => Resolution::Drop(DropReason::AlleleMismatch),
    }
}

fn resolve_palindromic(
    exp: &SummaryRecord,
    out: &SummaryRecord,
    a1: &str,
    a2: &str,
    b1: &str,
    b2: &str,
    threshold: f64,
) -> Resolution {
    // Complementary alleles make the strand unobservable from labels alone.
    let Some(labels) = alignment(a1, a2, b1, b2) else {
        return Resolution::Drop(DropReason::AlleleMismatch);
    };
    let (Some(f_exp), Some(f_out)) = (exp.eaf, out.eaf) else {
        return Resolution::Drop(DropReason::PalindromicAmbiguous);
    };
    if !f_exp.is_finite() || !f_out.is_finite() {
        return Resolution::Drop(DropReason::PalindromicAmbiguous);
    }
    let f_out = match labels {
        Alignment::Same => f_out,
        Alignment::Swapped => 1.0 - f_out,
    };
    let ambiguous = |f: f64| (f - 0.5).abs() <= threshold;
    if ambiguous(f_exp) || ambiguous(f_out) {
        return Resolution::Drop(DropReason::PalindromicAmbiguous);
    }
    let strand = (f_exp < 0.5) != (f_out < 0.5);
    Resolution::Keep {
        flip: (labels == Alignment::Swapped) != strand,
        strand,
    }
}

fn align(exp: &SummaryRecord, out: &SummaryRecord, flip: bool) -> HarmonizedVariant {
    let (beta_out, eaf_out) = if flip {
        (-out.beta, out.eaf.map(|f| 1.0 - f))
    } else {
        (out.beta, out.eaf)
    };
    HarmonizedVariant {
        id: exp.id.clone(),
        effect_allele: upper(&exp.effect_allele),
        other_allele: upper(&exp.other_allele),
        beta_exp: exp.beta,
        se_exp: exp.se,
        beta_out,
        se_out: out.se,
        eaf_exp: exp.eaf,
        eaf_out,
    }
}
