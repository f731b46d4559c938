//! Overwrite-mode table snapshots.
//!
//! Each stage output lives at a fixed path under the store root, one CSV per
//! table plus a `.catalog.json` sidecar describing it. Writes replace the
//! previous snapshot wholesale, schema included.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::loader::{read_raw, RawSheet};
use crate::sheet::{Sheet, SheetRow};

const REFERENCE_SOURCE: &str = "Atributos das Unidades de Conservacao Federais (ICMBio), \
     https://dados.gov.br/dados/conjuntos-dados/atributos-das-unidades-de-conservacao-federais";
const FIRE_SOURCE: &str = "Areas Queimadas em Unidades de Conservacao Federais (ICMBio), \
     https://dados.gov.br/dados/conjuntos-dados/incendios-em-ucs";

static COLUMN_DESCRIPTIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("CNUC", "National conservation unit code (MMA)"),
        ("TIPO_NOME", "Conservation unit with abbreviated category"),
        ("NOME_UC", "Conservation unit full name"),
        ("TIPO", "Conservation unit category (Law 9985/2000, SNUC)"),
        ("NGI", "Integrated management nucleus"),
        ("GR", "Regional management office"),
        ("Atos_legais", "Legal instruments creating or redefining the unit"),
        ("UF", "States covered by the unit"),
        ("Bioma_predominante", "Biome covering 50% or more of the unit (IBGE 1:250k)"),
        ("Bioma_comp_RL", "Biome for legal-reserve compensation"),
        ("Area", "Unit area in hectares"),
        ("ind", "Generated row index"),
        ("UC", "Conservation unit with abbreviated category"),
        ("Bioma", "Biome reported with the fire record"),
        ("Area_queimada", "Total burned area in hectares, excluding fire-prevention area"),
        ("Area_UC", "Unit area in hectares"),
        ("Perc_UC", "Burned area as a percentage of unit area"),
        ("Data_ult_atual", "Last update of the source dataset"),
        ("Satelite", "Satellite imagery used to detect fire scars"),
        ("Incendio", "Area in hectares affected by wildfire"),
        ("Queima_prescrita", "Prescribed burn in hectares"),
        ("Queima_controlada", "Controlled burn in hectares"),
        ("Fogo_natural", "Area in hectares burned by natural causes"),
        ("ano", "Year of the fire record"),
    ])
});

/// Fixed storage location of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKey {
    Reference,
    Year(i32),
}

impl SnapshotKey {
    pub fn file_stem(self) -> String {
        match self {
            SnapshotKey::Reference => "uc_atualizado_jun_2024".to_string(),
            SnapshotKey::Year(year) => format!("uc_{}_incendio", year),
        }
    }

    fn source(self) -> &'static str {
        match self {
            SnapshotKey::Reference => REFERENCE_SOURCE,
            SnapshotKey::Year(_) => FIRE_SOURCE,
        }
    }

    fn year(self) -> Option<i32> {
        match self {
            SnapshotKey::Reference => None,
            SnapshotKey::Year(year) => Some(year),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnEntry {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCatalog {
    pub table: String,
    pub source: String,
    pub year: Option<i32>,
    pub row_count: usize,
    pub columns: Vec<ColumnEntry>,
    pub written_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(SnapshotStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_path(&self, key: SnapshotKey) -> PathBuf {
        self.root.join(format!("{}.csv", key.file_stem()))
    }

    pub fn catalog_path(&self, key: SnapshotKey) -> PathBuf {
        self.root.join(format!("{}.catalog.json", key.file_stem()))
    }

    pub fn exists(&self, key: SnapshotKey) -> bool {
        self.table_path(key).exists()
    }

    /// Replace the snapshot for `key` with `sheet`.
    pub fn write<R: SheetRow>(&self, key: SnapshotKey, sheet: &Sheet<R>) -> Result<PathBuf> {
        let path = self.table_path(key);
        let tmp = path.with_extension("csv.tmp");
        {
            let mut wtr = csv::Writer::from_path(&tmp)?;
            wtr.write_record(sheet.columns())?;
            for record in sheet.records() {
                wtr.write_record(&record)?;
            }
            wtr.flush()?;
        }
        fs::rename(&tmp, &path)?;

        let catalog = TableCatalog {
            table: sheet.name().to_string(),
            source: key.source().to_string(),
            year: key.year(),
            row_count: sheet.len(),
            columns: sheet
                .columns()
                .iter()
                .map(|c| ColumnEntry {
                    name: c.clone(),
                    description: COLUMN_DESCRIPTIONS.get(c.as_str()).map(|d| d.to_string()),
                })
                .collect(),
            written_at: Utc::now(),
        };
        fs::write(
            self.catalog_path(key),
            serde_json::to_string_pretty(&catalog)?,
        )?;
        info!(table = sheet.name(), rows = sheet.len(), path = %path.display(), "wrote snapshot");
        Ok(path)
    }

    pub fn read(&self, key: SnapshotKey) -> Result<RawSheet> {
        read_raw(&self.table_path(key))
    }

    pub fn read_catalog(&self, key: SnapshotKey) -> Result<TableCatalog> {
        let content = fs::read_to_string(self.catalog_path(key))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Read a snapshot and check it against its catalog: same columns in
    /// the same order, same number of rows.
    pub fn read_verified(&self, key: SnapshotKey) -> Result<RawSheet> {
        let catalog = self.read_catalog(key)?;
        let sheet = self.read(key)?;
        let mismatch = |reason: String| PipelineError::Catalog {
            table: catalog.table.clone(),
            reason,
        };
        let columns: Vec<&str> = sheet.headers().iter().collect();
        let expected: Vec<&str> = catalog.columns.iter().map(|c| c.name.as_str()).collect();
        if columns != expected {
            return Err(mismatch(format!(
                "columns {:?}, catalog lists {:?}",
                columns, expected
            )));
        }
        if sheet.records().len() != catalog.row_count {
            return Err(mismatch(format!(
                "{} rows on disk, catalog records {}",
                sheet.records().len(),
                catalog.row_count
            )));
        }
        Ok(sheet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FireRow;
    use tempfile::tempdir;

    fn sheet(names: &[&str]) -> Sheet<FireRow> {
        let mut csv = String::from("UC,Area_queimada,Perc_UC,Data_ult_atual,MIF\n");
        for name in names {
            csv.push_str(&format!("\"{}\",292599.9242,,01/03/2021,\n", name));
        }
        Sheet::from_csv_text("incendio_2020", &csv)
    }

    #[test]
    fn snapshot_round_trips_values() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path().join("store")).unwrap();
        let original = sheet(&["PARNA DA SERRA DOS ORGAOS ", "APA BACIA PARAIBA DO SUL"]);
        store.write(SnapshotKey::Year(2020), &original).unwrap();
        let raw = store.read(SnapshotKey::Year(2020)).unwrap();
        assert_eq!(&raw.records()[1][3], "2021-03-01");
        let back: Sheet<FireRow> = Sheet::from_raw("incendio_2020", &raw).unwrap();
        assert_eq!(back.columns(), original.columns());
        assert_eq!(back.rows(), original.rows());
        assert_eq!(back.rows()[0].facility, "PARNA DA SERRA DOS ORGAOS ");
        assert_eq!(back.rows()[0].burned_area, Some(292599.9242));
        assert_eq!(back.rows()[1].percent_burned, None);
    }

    #[test]
    fn second_write_overwrites_first() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        store.write(SnapshotKey::Year(2020), &sheet(&["A", "B", "C"])).unwrap();
        let narrower: Sheet<FireRow> =
            Sheet::from_csv_text("incendio_2020", "UC,Area_queimada,Perc_UC\nD,1,1\n");
        store.write(SnapshotKey::Year(2020), &narrower).unwrap();

        let back = store.read_verified(SnapshotKey::Year(2020)).unwrap();
        assert_eq!(back.records().len(), 1);
        assert!(!back.has_column("MIF"));
        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn catalog_describes_columns() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        store.write(SnapshotKey::Year(2020), &sheet(&["A"])).unwrap();
        let catalog = store.read_catalog(SnapshotKey::Year(2020)).unwrap();
        assert_eq!(catalog.year, Some(2020));
        assert_eq!(catalog.row_count, 1);
        assert!(catalog.source.contains("incendios-em-ucs"));
        let mif = catalog.columns.iter().find(|c| c.name == "MIF").unwrap();
        assert_eq!(mif.description, None);
        assert!(catalog.columns[0].description.is_some());
    }

    #[test]
    fn truncated_snapshot_disagrees_with_catalog() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        store.write(SnapshotKey::Year(2020), &sheet(&["A", "B"])).unwrap();
        let path = store.table_path(SnapshotKey::Year(2020));
        let content = fs::read_to_string(&path).unwrap();
        let kept: Vec<&str> = content.lines().take(2).collect();
        fs::write(&path, kept.join("\n") + "\n").unwrap();

        let err = store.read_verified(SnapshotKey::Year(2020)).unwrap_err();
        assert!(matches!(err, PipelineError::Catalog { ref table, .. } if table == "incendio_2020"));
        assert_eq!(store.read(SnapshotKey::Year(2020)).unwrap().records().len(), 1);
    }

    #[test]
    fn fixed_paths_per_key() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        assert!(store
            .table_path(SnapshotKey::Reference)
            .ends_with("uc_atualizado_jun_2024.csv"));
        assert!(store
            .table_path(SnapshotKey::Year(2018))
            .ends_with("uc_2018_incendio.csv"));
    }
}
