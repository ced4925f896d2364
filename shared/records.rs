//! # Record Table Loading
//!
//! Entry point for the standardized ISPC record files. A record file is a
//! delimited text table with one row per sampled plot and depth band. Its
//! columns fall into two groups:
//!
//! - Variables: the fifteen measured quantities, coerced to `f64`. Empty or
//!   non-numeric cells are missing and stored as `NaN`; they are never an error
//!   at load time and never imputed later.
//! - Metadata: year, depth band, plot and crop, plus any unknown column, kept
//!   verbatim as strings.
//!
//! Headers may use the canonical keys (`estoque_c`) or the spreadsheet headers
//! the keys were derived from (`Estoque de C`).

use ndarray::{Array1, Array2, ArrayView1};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

/// The ten inexpensive measurements used as model inputs, in contract order.
pub const INPUT_FEATURES: [&str; 10] = [
    "dmg",
    "estoque_c",
    "na",
    "icv",
    "altura",
    "diam_espiga",
    "comp_espiga",
    "n_plantas",
    "n_espigas",
    "produtividade",
];

/// The five expensive measurements the reduced mode estimates, in contract order.
pub const TARGETS: [&str; 5] = ["dmp", "rmp", "densidade", "n_espigas_com", "peso_espigas"];

pub const META_COLUMNS: [&str; 4] = ["ano", "profundidade_cm", "parcela", "cultura"];

pub const YEAR_COLUMN: &str = "ano";

pub const DEPTH_COLUMN: &str = "profundidade_cm";

/// Spreadsheet header and the canonical key it maps to.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub raw: &'static str,
    pub key: &'static str,
}

pub const ISPC_COLUMNS: [ColumnSpec; 17] = [
    ColumnSpec { raw: "Parcela", key: "parcela" },
    ColumnSpec { raw: "Cultura", key: "cultura" },
    ColumnSpec { raw: "DMG", key: "dmg" },
    ColumnSpec { raw: "DMP", key: "dmp" },
    ColumnSpec { raw: "RMP", key: "rmp" },
    ColumnSpec { raw: "Densidade", key: "densidade" },
    ColumnSpec { raw: "Estoque de C", key: "estoque_c" },
    ColumnSpec { raw: "Na", key: "na" },
    ColumnSpec { raw: "ICV(%)", key: "icv" },
    ColumnSpec { raw: "Altura de Plantas", key: "altura" },
    ColumnSpec { raw: "Diâmetro espiga", key: "diam_espiga" },
    ColumnSpec { raw: "Comprimento espiga", key: "comp_espiga" },
    ColumnSpec { raw: "Número de plantas_ha", key: "n_plantas" },
    ColumnSpec { raw: "N total de espigas_ha", key: "n_espigas" },
    ColumnSpec { raw: "N de espigas comerciais_ha", key: "n_espigas_com" },
    ColumnSpec { raw: "Peso de espigas comerciais_ha", key: "peso_espigas" },
    ColumnSpec { raw: "Produtividade", key: "produtividade" },
];

/// All fifteen variables in the audit's canonical order.
pub const ISPC_VARIABLES: [&str; 15] = [
    "dmg",
    "dmp",
    "rmp",
    "densidade",
    "estoque_c",
    "na",
    "icv",
    "altura",
    "diam_espiga",
    "comp_espiga",
    "n_plantas",
    "n_espigas",
    "n_espigas_com",
    "peso_espigas",
    "produtividade",
];

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error while parsing the record file: {0}")]
    Csv(#[from] csv::Error),
    #[error("Required columns are missing from the record table: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("Column '{0}' appears more than once after header normalization")]
    DuplicateColumn(String),
    #[error("Column '{name}' has {found} values, but the table has {expected} rows")]
    LengthMismatch {
        name: String,
        found: usize,
        expected: usize,
    },
    #[error("Column '{0}' is not a numeric variable of the record table")]
    NotNumeric(String),
}

/// Ordered input and target names. Part of the model contract: a model is only
/// valid for inputs named exactly as at training time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSet {
    pub inputs: Vec<String>,
    pub targets: Vec<String>,
}

impl FeatureSet {
    pub fn ispc() -> Self {
        Self {
            inputs: INPUT_FEATURES.iter().map(|s| s.to_string()).collect(),
            targets: TARGETS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Every column a training table must carry: inputs, targets and metadata.
    pub fn required_columns(&self) -> Vec<String> {
        self.inputs
            .iter()
            .chain(&self.targets)
            .cloned()
            .chain(META_COLUMNS.iter().map(|s| s.to_string()))
            .collect()
    }
}

/// Maps a header to its canonical key; unknown headers pass through trimmed.
pub fn canonical_key(header: &str) -> String {
    let header = header.trim();
    ISPC_COLUMNS
        .iter()
        .find(|column| column.raw == header)
        .map(|column| column.key.to_string())
        .unwrap_or_else(|| header.to_string())
}

/// Depth band encoded in a sheet or partition name: `dados_010` is the
/// 0-10 cm band and `dados_1020` the 10-20 cm band.
pub fn depth_for_tag(tag: &str) -> Option<&'static str> {
    match tag {
        "dados_010" => Some("0-10"),
        "dados_1020" => Some("10-20"),
        _ => None,
    }
}

fn is_variable(key: &str) -> bool {
    ISPC_VARIABLES.contains(&key)
}

/// Lenient numeric coercion: anything that is not a finite number is missing.
pub fn parse_cell(cell: &str) -> f64 {
    match cell.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => f64::NAN,
    }
}

/// Column-oriented table of numeric variables and string metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    n_rows: usize,
    numeric: BTreeMap<String, Array1<f64>>,
    meta: BTreeMap<String, Vec<String>>,
}

impl RecordTable {
    pub fn new(n_rows: usize) -> Self {
        Self {
            n_rows,
            ..Self::default()
        }
    }

    pub fn with_numeric(mut self, name: &str, values: Vec<f64>) -> Result<Self, RecordError> {
        self.check_len(name, values.len())?;
        self.numeric.insert(name.to_string(), Array1::from_vec(values));
        Ok(self)
    }

    pub fn with_meta(mut self, name: &str, values: Vec<String>) -> Result<Self, RecordError> {
        self.check_len(name, values.len())?;
        self.meta.insert(name.to_string(), values);
        Ok(self)
    }

    fn check_len(&self, name: &str, found: usize) -> Result<(), RecordError> {
        if found != self.n_rows {
            return Err(RecordError::LengthMismatch {
                name: name.to_string(),
                found,
                expected: self.n_rows,
            });
        }
        if self.numeric.contains_key(name) || self.meta.contains_key(name) {
            return Err(RecordError::DuplicateColumn(name.to_string()));
        }
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.numeric.contains_key(name) || self.meta.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.numeric.get(name).map(|col| col.view())
    }

    pub fn meta_column(&self, name: &str) -> Option<&[String]> {
        self.meta.get(name).map(Vec::as_slice)
    }

    /// Names from `required` that the table lacks, in the order given.
    pub fn missing_columns<'a, I>(&self, required: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        required
            .into_iter()
            .filter(|name| !self.has_column(name))
            .map(str::to_string)
            .collect()
    }

    fn numeric_columns(&self, columns: &[String]) -> Result<Vec<ArrayView1<'_, f64>>, RecordError> {
        columns
            .iter()
            .map(|name| {
                self.column(name)
                    .ok_or_else(|| RecordError::NotNumeric(name.clone()))
            })
            .collect()
    }

    /// Indices of rows where every listed column is present.
    pub fn complete_rows(&self, columns: &[String]) -> Result<Vec<usize>, RecordError> {
        let views = self.numeric_columns(columns)?;
        Ok((0..self.n_rows)
            .filter(|&row| views.iter().all(|col| !col[row].is_nan()))
            .collect())
    }

    /// Dense `rows × columns` matrix in the given orders.
    pub fn select(&self, columns: &[String], rows: &[usize]) -> Result<Array2<f64>, RecordError> {
        let views = self.numeric_columns(columns)?;
        Ok(Array2::from_shape_fn((rows.len(), views.len()), |(i, j)| {
            views[j][rows[i]]
        }))
    }

    /// Copy of the table restricted to the rows for which `keep` holds.
    pub fn filter_rows<F>(&self, keep: F) -> RecordTable
    where
        F: Fn(usize) -> bool,
    {
        let rows: Vec<usize> = (0..self.n_rows).filter(|&r| keep(r)).collect();
        RecordTable {
            n_rows: rows.len(),
            numeric: self
                .numeric
                .iter()
                .map(|(name, col)| (name.clone(), rows.iter().map(|&r| col[r]).collect()))
                .collect(),
            meta: self
                .meta
                .iter()
                .map(|(name, col)| (name.clone(), rows.iter().map(|&r| col[r].clone()).collect()))
                .collect(),
        }
    }

    /// Sets the blank cells of metadata column `name` to `value`. A missing
    /// column is added, holding `value` on every row.
    pub fn fill_meta(&mut self, name: &str, value: &str) -> Result<(), RecordError> {
        if self.numeric.contains_key(name) {
            return Err(RecordError::DuplicateColumn(name.to_string()));
        }
        let n_rows = self.n_rows;
        let column = self
            .meta
            .entry(name.to_string())
            .or_insert_with(|| vec![String::new(); n_rows]);
        for cell in column.iter_mut().filter(|c| c.trim().is_empty()) {
            *cell = value.to_string();
        }
        Ok(())
    }

    /// Canonical column order: year and depth, then the spreadsheet columns.
    /// Columns outside the ISPC schema are not written.
    fn canonical_columns(&self) -> Vec<&'static str> {
        [YEAR_COLUMN, DEPTH_COLUMN]
            .into_iter()
            .chain(ISPC_COLUMNS.iter().map(|column| column.key))
            .filter(|name| self.has_column(name))
            .collect()
    }

    /// Writes the table as comma-separated text with canonical keys as headers.
    /// Missing numeric values become empty cells.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), RecordError> {
        let columns = self.canonical_columns();
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&columns)?;
        for row in 0..self.n_rows {
            let cells = columns.iter().map(|name| match self.numeric.get(*name) {
                Some(col) if col[row].is_nan() => String::new(),
                Some(col) => col[row].to_string(),
                None => self.meta.get(*name).map_or_else(String::new, |col| col[row].clone()),
            });
            csv_writer.write_record(cells)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn save_csv(&self, path: &Path) -> Result<(), RecordError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.write_csv(File::create(path)?)?;
        log::info!("Saved {} records to '{}'", self.n_rows, path.display());
        Ok(())
    }

    /// Rows whose trimmed depth band equals `depth`. Without a depth column the
    /// table is returned unchanged.
    pub fn retain_depth(&self, depth: &str) -> RecordTable {
        match self.meta_column(DEPTH_COLUMN) {
            Some(bands) => self.filter_rows(|row| bands[row].trim() == depth),
            None => self.clone(),
        }
    }
}

fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some("tsv") => b'\t',
        _ => b',',
    }
}

/// Reads a delimited table without checking for any particular column.
pub fn read_table<R: Read>(reader: R, delimiter: u8) -> Result<RecordTable, RecordError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);

    let keys: Vec<String> = csv_reader.headers()?.iter().map(canonical_key).collect();
    let mut cells: Vec<Vec<String>> = vec![Vec::new(); keys.len()];
    let mut n_rows = 0;
    for record in csv_reader.records() {
        let record = record?;
        for (j, column) in cells.iter_mut().enumerate() {
            column.push(record.get(j).unwrap_or("").to_string());
        }
        n_rows += 1;
    }

    let mut table = RecordTable::new(n_rows);
    for (key, column) in keys.into_iter().zip(cells) {
        table = if is_variable(&key) {
            let values = column.iter().map(|c| parse_cell(c)).collect();
            table.with_numeric(&key, values)?
        } else {
            table.with_meta(&key, column)?
        };
    }
    Ok(table)
}

/// Loads any delimited table (`.tsv` is tab-separated, everything else comma).
pub fn load_table(path: &Path) -> Result<RecordTable, RecordError> {
    log::info!("Loading table from '{}'", path.display());
    let table = read_table(File::open(path)?, delimiter_for(path))?;
    log::info!("Loaded {} rows", table.n_rows());
    Ok(table)
}

/// Loads a record file for training; the metadata columns must be present.
pub fn load_records(path: &Path) -> Result<RecordTable, RecordError> {
    let table = load_table(path)?;
    let missing = table.missing_columns(META_COLUMNS);
    if !missing.is_empty() {
        return Err(RecordError::MissingColumns(missing));
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use tempfile::Builder;

    fn write_temp(content: &str, suffix: &str) -> io::Result<tempfile::NamedTempFile> {
        let mut file = Builder::new().suffix(suffix).tempfile()?;
        write!(file, "{content}")?;
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn numeric_coercion_marks_bad_cells_missing() {
        assert_eq!(parse_cell(" 2.5 "), 2.5);
        assert!(parse_cell("").is_nan());
        assert!(parse_cell("n/a").is_nan());
        assert!(parse_cell("inf").is_nan());
    }

    #[test]
    fn raw_headers_map_to_keys() {
        let content = "ano,profundidade_cm,Parcela,Cultura,Estoque de C,ICV(%),notes\n\
                       2023,0-10,P1,milho,12.5,,ok\n\
                       2023,10-20,P2,milho,x,80,\n";
        let table = read_table(content.as_bytes(), b',').unwrap();
        assert_eq!(table.n_rows(), 2);
        let stock = table.column("estoque_c").unwrap();
        assert_eq!(stock[0], 12.5);
        assert!(stock[1].is_nan());
        let icv = table.column("icv").unwrap();
        assert!(icv[0].is_nan());
        assert_eq!(icv[1], 80.0);
        assert_eq!(table.meta_column("parcela").unwrap(), ["P1", "P2"]);
        assert_eq!(table.meta_column("notes").unwrap(), ["ok", ""]);
    }

    #[test]
    fn complete_rows_and_select_follow_requested_order() {
        let table = RecordTable::new(4)
            .with_numeric("dmg", vec![1.0, f64::NAN, 3.0, 4.0])
            .unwrap()
            .with_numeric("dmp", vec![10.0, 20.0, f64::NAN, 40.0])
            .unwrap();
        let cols = vec!["dmp".to_string(), "dmg".to_string()];
        let rows = table.complete_rows(&cols).unwrap();
        assert_eq!(rows, vec![0, 3]);
        let x = table.select(&cols, &rows).unwrap();
        assert_eq!(x, ndarray::array![[10.0, 1.0], [40.0, 4.0]]);
        assert!(matches!(
            table.complete_rows(&["rmp".to_string()]),
            Err(RecordError::NotNumeric(name)) if name == "rmp"
        ));
    }

    #[test]
    fn depth_filter_trims_band_labels() {
        let table = RecordTable::new(3)
            .with_meta(
                DEPTH_COLUMN,
                vec![" 0-10".to_string(), "10-20".to_string(), "0-10 ".to_string()],
            )
            .unwrap()
            .with_numeric("dmg", vec![1.0, 2.0, 3.0])
            .unwrap();
        let shallow = table.retain_depth("0-10");
        assert_eq!(shallow.n_rows(), 2);
        assert_eq!(shallow.column("dmg").unwrap().to_vec(), vec![1.0, 3.0]);
    }

    #[test]
    fn training_loader_requires_metadata() {
        let file = write_temp("ano,parcela,dmg\n2023,P1,1.0\n", ".csv").unwrap();
        match load_records(file.path()) {
            Err(RecordError::MissingColumns(cols)) => {
                assert_eq!(cols, vec!["profundidade_cm", "cultura"])
            }
            other => panic!("Expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn tsv_extension_switches_delimiter() {
        let file = write_temp(
            "ano\tprofundidade_cm\tparcela\tcultura\tdmg\n2024\t0-10\tP9\tsoja\t0.75\n",
            ".tsv",
        )
        .unwrap();
        let table = load_records(file.path()).unwrap();
        assert_eq!(table.column("dmg").unwrap()[0], 0.75);
    }

    #[test]
    fn sheet_names_carry_depth_bands() {
        assert_eq!(depth_for_tag("dados_010"), Some("0-10"));
        assert_eq!(depth_for_tag("dados_1020"), Some("10-20"));
        assert_eq!(depth_for_tag("historico"), None);
    }

    #[test]
    fn fill_meta_adds_missing_columns_and_fills_blanks() {
        let mut table = RecordTable::new(3)
            .with_meta(YEAR_COLUMN, vec!["2022".to_string(), " ".to_string(), String::new()])
            .unwrap()
            .with_numeric("dmg", vec![1.0, 2.0, 3.0])
            .unwrap();
        table.fill_meta(YEAR_COLUMN, "2024").unwrap();
        table.fill_meta(DEPTH_COLUMN, "10-20").unwrap();
        assert_eq!(table.meta_column(YEAR_COLUMN).unwrap(), ["2022", "2024", "2024"]);
        assert_eq!(table.meta_column(DEPTH_COLUMN).unwrap(), ["10-20"; 3]);
        assert!(matches!(
            table.fill_meta("dmg", "x"),
            Err(RecordError::DuplicateColumn(name)) if name == "dmg"
        ));
    }

    #[test]
    fn canonical_csv_reloads_as_training_records() {
        let content = "Parcela,Cultura,DMG,DMP,notes\nP1,milho,1.25,,a\nP2,soja,x,0.5,b\n";
        let mut table = read_table(content.as_bytes(), b',').unwrap();
        table.fill_meta(YEAR_COLUMN, "2024").unwrap();
        table.fill_meta(DEPTH_COLUMN, "0-10").unwrap();

        let mut bytes = Vec::new();
        table.write_csv(&mut bytes).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "ano,profundidade_cm,parcela,cultura,dmg,dmp\n\
             2024,0-10,P1,milho,1.25,\n\
             2024,0-10,P2,soja,,0.5\n"
        );

        let file = write_temp(&text, ".csv").unwrap();
        let reloaded = load_records(file.path()).unwrap();
        assert_eq!(reloaded.column("dmg").unwrap()[0], 1.25);
        assert!(reloaded.column("dmp").unwrap()[0].is_nan());
    }

    #[test]
    fn mismatched_column_length_is_rejected() {
        let err = RecordTable::new(2).with_numeric("dmg", vec![1.0]).unwrap_err();
        assert!(matches!(
            err,
            RecordError::LengthMismatch { found: 1, expected: 2, .. }
        ));
    }

    #[test]
    fn feature_set_lists_every_required_column() {
        let required = FeatureSet::ispc().required_columns();
        assert_eq!(required.len(), 19);
        assert_eq!(required[0], "dmg");
        assert_eq!(required[10], "dmp");
        assert_eq!(required[18], "cultura");
    }
}
