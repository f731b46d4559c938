//! Typed sheets.
//!
//! A `Sheet<R>` deserializes every record into the serde row `R` for the
//! columns `R` knows about. Any other column (yearly sheets carry a handful
//! that change from year to year) is kept verbatim next to the row, so
//! snapshots write back the full schema.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;

use crate::error::{PipelineError, Result};
use crate::loader::RawSheet;

/// A serde row bound to named columns.
pub trait SheetRow: DeserializeOwned + Clone {
    /// Columns deserialized into typed fields.
    const COLUMNS: &'static [&'static str];
    /// Columns every sheet of this row type must carry.
    const REQUIRED: &'static [&'static str];

    /// Text form of a typed column, `None` when the cell is empty.
    fn cell(&self, column: &str) -> Option<String>;

    /// Borrow a text column. Numeric and date columns return `None`.
    fn text(&self, column: &str) -> Option<&str>;

    /// Overwrite a text column. Returns `false` for columns that do not
    /// hold text.
    fn set_text(&mut self, column: &str, value: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Typed,
    Extra(usize),
}

/// Outcome of a conditional update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateCount {
    /// Rows satisfying the condition.
    pub matched: usize,
    /// Rows whose target cell actually changed.
    pub changed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet<R> {
    name: String,
    columns: Vec<String>,
    extra_columns: Vec<String>,
    rows: Vec<R>,
    extras: Vec<Vec<String>>,
}

impl<R: SheetRow> Sheet<R> {
    /// Deserialize `raw` record by record. The first record that does not
    /// fit `R` aborts with its source line.
    pub fn from_raw(name: impl Into<String>, raw: &RawSheet) -> Result<Self> {
        let name = name.into();
        for column in R::REQUIRED {
            if !raw.has_column(column) {
                return Err(PipelineError::MissingColumn {
                    table: name,
                    column: column.to_string(),
                });
            }
        }
        let columns: Vec<String> = raw.headers().iter().map(str::to_string).collect();
        let extra_idx: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !R::COLUMNS.contains(&c.as_str()))
            .map(|(i, _)| i)
            .collect();

        let mut rows = Vec::with_capacity(raw.records().len());
        let mut extras: Vec<Vec<String>> = Vec::with_capacity(raw.records().len());
        for (idx, record) in raw.records().iter().enumerate() {
            let row: R = record
                .deserialize(Some(raw.headers()))
                .map_err(|e| raw.malformed_at(idx, e.to_string()))?;
            rows.push(row);
            extras.push(extra_idx.iter().map(|&i| record[i].to_string()).collect());
        }
        Ok(Sheet {
            name,
            extra_columns: extra_idx.iter().map(|&i| columns[i].clone()).collect(),
            columns,
            rows,
            extras,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [R] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    fn slot(&self, column: &str) -> Result<Slot> {
        if !self.has_column(column) {
            return Err(PipelineError::MissingColumn {
                table: self.name.clone(),
                column: column.to_string(),
            });
        }
        Ok(match self.extra_columns.iter().position(|c| c == column) {
            Some(i) => Slot::Extra(i),
            None => Slot::Typed,
        })
    }

    /// The one way cells are compared as text: typed text fields as
    /// stored, extra columns verbatim, empty cells as `None`.
    fn text_at(&self, idx: usize, column: &str, slot: Slot) -> Option<&str> {
        match slot {
            Slot::Typed => self.rows[idx].text(column),
            Slot::Extra(i) => Some(self.extras[idx][i].as_str()).filter(|s| !s.is_empty()),
        }
    }

    /// Append a typed column that rows start filling in, such as the year
    /// tag. No-op when present.
    pub fn add_column(&mut self, column: &str) {
        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }
    }

    /// Distinct non-empty text values of a column.
    pub fn distinct_text(&self, column: &str) -> Result<BTreeSet<String>> {
        let slot = self.slot(column)?;
        Ok((0..self.rows.len())
            .filter_map(|idx| self.text_at(idx, column, slot))
            .map(str::to_string)
            .collect())
    }

    /// `UPDATE sheet SET set_column = value WHERE when_column = equals`.
    ///
    /// Matching is exact; nothing is trimmed or case-folded.
    pub fn update_where(
        &mut self,
        when_column: &str,
        equals: &str,
        set_column: &str,
        value: &str,
    ) -> Result<UpdateCount> {
        let when = self.slot(when_column)?;
        let set = self.slot(set_column)?;
        let mut count = UpdateCount::default();
        for idx in 0..self.rows.len() {
            if self.text_at(idx, when_column, when) != Some(equals) {
                continue;
            }
            count.matched += 1;
            if self.text_at(idx, set_column, set) == Some(value) {
                continue;
            }
            match set {
                Slot::Typed => {
                    if !self.rows[idx].set_text(set_column, value) {
                        return Err(PipelineError::NotText {
                            table: self.name.clone(),
                            column: set_column.to_string(),
                        });
                    }
                }
                Slot::Extra(i) => self.extras[idx][i] = value.to_string(),
            }
            count.changed += 1;
        }
        Ok(count)
    }

    /// Every row rendered in `columns()` order, empty cells as `""`.
    pub fn records(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        let slots: Vec<Slot> = self
            .columns
            .iter()
            .map(|c| match self.extra_columns.iter().position(|e| e == c) {
                Some(i) => Slot::Extra(i),
                None => Slot::Typed,
            })
            .collect();
        self.rows.iter().zip(&self.extras).map(move |(row, extra)| {
            self.columns
                .iter()
                .zip(&slots)
                .map(|(column, slot)| match slot {
                    Slot::Typed => row.cell(column).unwrap_or_default(),
                    Slot::Extra(i) => extra[*i].clone(),
                })
                .collect()
        })
    }
}

#[cfg(test)]
impl<R: SheetRow> Sheet<R> {
    /// Build a sheet from inline CSV text.
    pub fn from_csv_text(name: &str, text: &str) -> Self {
        let raw = RawSheet::from_reader(std::path::Path::new("inline.csv"), text.as_bytes()).unwrap();
        Sheet::from_raw(name, &raw).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FireRow;
    use std::path::Path;

    fn sheet(text: &str) -> Sheet<FireRow> {
        Sheet::from_csv_text("incendio", text)
    }

    const FIRES: &str = "ind,UC,Bioma,Area_queimada,Perc_UC,MIF\n\
                         0,PARNA A,CERRADO,10.5,1.0,x\n\
                         1,PARNA B,,3,2.0,\n\
                         2,PARNA A,CERRADO,1.0,,x\n";

    #[test]
    fn typed_and_extra_columns_are_split() {
        let s = sheet(FIRES);
        assert_eq!(s.len(), 3);
        assert_eq!(s.columns(), ["ind", "UC", "Bioma", "Area_queimada", "Perc_UC", "MIF"]);
        assert_eq!(s.rows()[1].burned_area, Some(3.0));
        assert_eq!(s.rows()[1].biome, None);
        assert_eq!(s.rows()[2].percent_burned, None);
        let first: Vec<String> = s.records().next().unwrap();
        assert_eq!(first, ["0", "PARNA A", "CERRADO", "10.5", "1", "x"]);
    }

    #[test]
    fn bad_number_names_its_line() {
        let raw = RawSheet::from_reader(
            Path::new("area_atingida_2018.csv"),
            "UC,Area_queimada,Perc_UC\nPARNA A,4500.5,1.0\nPARNA B,-,2.0\n".as_bytes(),
        )
        .unwrap();
        let err = Sheet::<FireRow>::from_raw("incendio_2018", &raw).unwrap_err();
        match err {
            PipelineError::MalformedRow { line, reason, .. } => {
                assert_eq!(line, 3);
                assert!(reason.contains("invalid number"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_required_column_is_reported() {
        let raw = RawSheet::from_reader(Path::new("x.csv"), "UC,Area_total\nA,1\n".as_bytes()).unwrap();
        let err = Sheet::<FireRow>::from_raw("incendio_2022", &raw).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { column, .. } if column == "Area_queimada"));
    }

    #[test]
    fn update_where_counts_matches_and_changes() {
        let mut s = sheet(FIRES);
        let count = s.update_where("UC", "PARNA A", "Bioma", "MATA ATLANTICA").unwrap();
        assert_eq!(count, UpdateCount { matched: 2, changed: 2 });

        let again = s.update_where("UC", "PARNA A", "Bioma", "MATA ATLANTICA").unwrap();
        assert_eq!(again, UpdateCount { matched: 2, changed: 0 });

        let none = s.update_where("UC", "PARNA A ", "UC", "X").unwrap();
        assert_eq!(none.matched, 0);
    }

    #[test]
    fn extra_columns_use_the_same_comparison() {
        let mut s = sheet(FIRES);
        assert_eq!(
            s.distinct_text("MIF").unwrap().into_iter().collect::<Vec<_>>(),
            vec!["x".to_string()]
        );
        let count = s.update_where("MIF", "x", "MIF", "y").unwrap();
        assert_eq!(count, UpdateCount { matched: 2, changed: 2 });
        assert_eq!(s.distinct_text("MIF").unwrap().len(), 1);
        assert!(s.distinct_text("MIF").unwrap().contains("y"));
    }

    #[test]
    fn numeric_columns_reject_text_updates() {
        let mut s = sheet(FIRES);
        assert!(matches!(
            s.update_where("UC", "PARNA B", "Area_queimada", "0"),
            Err(PipelineError::NotText { .. })
        ));
        assert!(matches!(
            s.update_where("UC", "PARNA A", "Satelite", "x"),
            Err(PipelineError::MissingColumn { .. })
        ));
    }
}
