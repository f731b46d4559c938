//! Referential-integrity diagnostics between the yearly sheets and the
//! reference attributes table. Read-only; safe to rerun after every
//! correction pass.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::schema::{ABBREVIATED_NAME, FACILITY};
use crate::sheet::{Sheet, SheetRow};
use crate::types::{FireRow, ReferenceEntity, ReferenceMatchRow};
use crate::util::format_number;

/// Distinct facility names in `yearly` with no equal `TIPO_NOME` in
/// `reference`, sorted. Empty means every row will join.
pub fn unmatched_facilities(
    yearly: &Sheet<FireRow>,
    reference: &Sheet<ReferenceEntity>,
) -> Result<Vec<String>> {
    unmatched_values(yearly, FACILITY, reference, ABBREVIATED_NAME)
}

pub fn unmatched_values<A: SheetRow, B: SheetRow>(
    sheet: &Sheet<A>,
    column: &str,
    reference: &Sheet<B>,
    reference_column: &str,
) -> Result<Vec<String>> {
    let known: BTreeSet<String> = reference.distinct_text(reference_column)?;
    Ok(sheet
        .distinct_text(column)?
        .into_iter()
        .filter(|name| !known.contains(name))
        .collect())
}

/// Reference units whose full name contains any of `keywords`, ignoring
/// case. Used to find the canonical spelling of an unmatched name.
pub fn search_reference(reference: &[ReferenceEntity], keywords: &[String]) -> Vec<ReferenceMatchRow> {
    let needles: Vec<String> = keywords.iter().map(|k| k.to_uppercase()).collect();
    reference
        .iter()
        .filter(|unit| {
            let name = unit.full_name.to_uppercase();
            needles.iter().any(|n| name.contains(n.as_str()))
        })
        .map(|unit| ReferenceMatchRow {
            abbreviated_name: unit.abbreviated_name.clone(),
            full_name: unit.full_name.clone(),
            area: unit.area_ha.map(|a| format_number(a, 4)).unwrap_or_default(),
        })
        .collect()
}
