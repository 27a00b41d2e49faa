use anyhow::Result;
use polars::prelude::*;

use crate::runner::MethodOutcome;
use crate::sensitivity::{LeaveOneOutRow, SingleVariantRow};
use crate::types::EstimateResult;

#[derive(Default)]
struct EstimateColumns {
    label: Vec<String>,
    beta: Vec<Option<f64>>,
    se: Vec<Option<f64>>,
    pval: Vec<Option<f64>>,
    or: Vec<Option<f64>>,
    or_lci: Vec<Option<f64>>,
    or_uci: Vec<Option<f64>>,
    nsnp: Vec<Option<u32>>,
    note: Vec<Option<String>>,
}

impl EstimateColumns {
    fn push(&mut self, label: String, result: std::result::Result<&EstimateResult, String>) {
        self.label.push(label);
        match result {
            Ok(r) => {
                self.beta.push(Some(r.beta));
                self.se.push(Some(r.se));
                self.pval.push(Some(r.pval));
                self.or.push(Some(r.or));
                self.or_lci.push(Some(r.or_lci));
                self.or_uci.push(Some(r.or_uci));
                self.nsnp.push(Some(r.nsnp as u32));
                let warnings: Vec<String> = r.warnings.iter().map(|w| w.to_string()).collect();
                self.note
                    .push((!warnings.is_empty()).then(|| warnings.join("; ")));
            }
            Err(msg) => {
                self.beta.push(None);
                self.se.push(None);
                self.pval.push(None);
                self.or.push(None);
                self.or_lci.push(None);
                self.or_uci.push(None);
                self.nsnp.push(None);
                self.note.push(Some(msg));
            }
        }
    }

    fn into_frame(self, label_col: &str) -> Result<DataFrame> {
        let df = df!(
            label_col => self.label,
            "beta" => self.beta,
            "se" => self.se,
            "pval" => self.pval,
            "OR" => self.or,
            "OR_lci" => self.or_lci,
            "OR_uci" => self.or_uci,
            "nsnp" => self.nsnp,
            "note" => self.note
        )?;
        Ok(df)
    }
}

pub fn estimates_table(outcomes: &[MethodOutcome]) -> Result<DataFrame> {
    let mut cols = EstimateColumns::default();
    for o in outcomes {
        cols.push(
            o.method.name().to_string(),
            o.result.as_ref().map_err(|e| e.to_string()),
        );
    }
    cols.into_frame("method")
}

pub fn leave_one_out_table(rows: &[LeaveOneOutRow]) -> Result<DataFrame> {
    let mut cols = EstimateColumns::default();
    for row in rows {
        cols.push(
            row.excluded_id.clone(),
            row.result.as_ref().map_err(|e| e.to_string()),
        );
    }
    cols.into_frame("excluded")
}

pub fn single_variant_table(rows: &[SingleVariantRow]) -> Result<DataFrame> {
    let mut cols = EstimateColumns::default();
    for row in rows {
        cols.push(row.id.clone(), Ok(&row.result));
    }
    cols.into_frame("SNP")
}
