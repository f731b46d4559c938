use crate::error::{PipelineError, Result};
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A CSV file as read from disk: cleaned header plus the records, each
/// still carrying its position in the source.
#[derive(Debug, Clone)]
pub struct RawSheet {
    path: PathBuf,
    headers: StringRecord,
    records: Vec<StringRecord>,
}

/// Load a comma-delimited UTF-8 file with a header row.
///
/// Any record that cannot be read (wrong field count, invalid UTF-8) aborts
/// the whole load; the caller never sees a partial sheet.
pub fn read_raw(path: &Path) -> Result<RawSheet> {
    let file = File::open(path)?;
    RawSheet::from_reader(path, file)
}

impl RawSheet {
    /// `path` labels the source in errors; the bytes come from `reader`.
    pub fn from_reader<R: Read>(path: &Path, reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers: StringRecord = rdr
            .headers()
            .map_err(|e| malformed(path, &e, 1))?
            .iter()
            .enumerate()
            .map(|(idx, h)| header_name(idx, h))
            .collect();

        let mut records = Vec::new();
        for (idx, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| malformed(path, &e, idx as u64 + 2))?;
            records.push(record);
        }
        debug!(
            rows = records.len(),
            columns = headers.len(),
            "read {}",
            path.display()
        );
        Ok(RawSheet {
            path: path.to_path_buf(),
            headers,
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    pub fn records(&self) -> &[StringRecord] {
        &self.records
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    /// Rename header `from` to `to`. Returns `false` without touching the
    /// sheet when `from` does not exist.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        if !self.has_column(from) {
            return false;
        }
        self.headers = self
            .headers
            .iter()
            .map(|h| if h == from { to } else { h })
            .collect();
        true
    }

    pub fn drop_column(&mut self, column: &str) -> bool {
        let Some(idx) = self.headers.iter().position(|h| h == column) else {
            return false;
        };
        self.headers = without(&self.headers, idx);
        for record in &mut self.records {
            let mut kept = without(record, idx);
            kept.set_position(record.position().cloned());
            *record = kept;
        }
        true
    }

    /// Source line of the record at `idx`, counting the header as line 1.
    pub fn line(&self, idx: usize) -> u64 {
        self.records
            .get(idx)
            .and_then(|r| r.position())
            .map_or(idx as u64 + 2, |p| p.line())
    }

    pub fn malformed_at(&self, idx: usize, reason: impl Into<String>) -> PipelineError {
        PipelineError::MalformedRow {
            path: self.path.clone(),
            line: self.line(idx),
            reason: reason.into(),
        }
    }
}

fn without(record: &StringRecord, idx: usize) -> StringRecord {
    record
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != idx)
        .map(|(_, field)| field)
        .collect()
}

fn malformed(path: &Path, err: &csv::Error, fallback_line: u64) -> PipelineError {
    let line = err
        .position()
        .map(|p| p.line())
        .unwrap_or(fallback_line);
    PipelineError::MalformedRow {
        path: path.to_path_buf(),
        line,
        reason: err.to_string(),
    }
}

/// Headers are trimmed and stripped of a UTF-8 BOM; an empty header gets
/// the positional name `_c{idx}`.
fn header_name(idx: usize, raw: &str) -> String {
    let trimmed = raw.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        format!("_c{}", idx)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file
    }

    #[test]
    fn keeps_values_verbatim() {
        let file = csv_file(
            b",UC,Area_queimada,Data_ult_atual\n\
              0,PARNA A,10,15/10/2021\n\
              1,\"PARNA B \",2.5,\n",
        );
        let sheet = read_raw(file.path()).unwrap();
        let headers: Vec<&str> = sheet.headers().iter().collect();
        assert_eq!(headers, ["_c0", "UC", "Area_queimada", "Data_ult_atual"]);
        assert_eq!(sheet.records().len(), 2);
        // trailing whitespace in values is preserved
        assert_eq!(&sheet.records()[1][1], "PARNA B ");
        assert_eq!(sheet.line(1), 3);
    }

    #[test]
    fn short_row_fails_the_whole_file() {
        let file = csv_file(b"UC,Area_queimada\nPARNA A,1.0\nPARNA B\n");
        let err = read_raw(file.path()).unwrap_err();
        match err {
            PipelineError::MalformedRow { path, line, .. } => {
                assert_eq!(path, file.path());
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_utf8_fails_with_its_line() {
        let file = csv_file(b"UC,Area_queimada\nPARNA A,1.0\nPARNA \xff\xfe,2.0\nPARNA C,3.0\n");
        let err = read_raw(file.path()).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRow { line: 3, .. }));
    }

    #[test]
    fn rename_and_drop_keep_rows_and_lines() {
        let mut sheet = RawSheet::from_reader(
            Path::new("dados_uc.csv"),
            "id,Nome_UC,UF\n1,PARQUE A,GO\n2,PARQUE B,MT\n".as_bytes(),
        )
        .unwrap();
        assert!(!sheet.rename_column("NOME", "NOME_UC"));
        assert!(sheet.rename_column("Nome_UC", "NOME_UC"));
        assert!(sheet.drop_column("id"));
        assert!(!sheet.drop_column("id"));
        let headers: Vec<&str> = sheet.headers().iter().collect();
        assert_eq!(headers, ["NOME_UC", "UF"]);
        assert_eq!(sheet.records().len(), 2);
        assert_eq!(&sheet.records()[1][0], "PARQUE B");
        assert_eq!(sheet.line(1), 3);
    }

    #[test]
    fn bom_and_padding_are_removed_from_headers() {
        assert_eq!(header_name(0, "\u{feff}id"), "id");
        assert_eq!(header_name(3, "  "), "_c3");
        assert_eq!(header_name(1, " UC "), "UC");
    }
}
