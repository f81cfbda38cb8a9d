//! Simulated source catalogs stored as FITS binary tables.
//!
//! The loader keeps two views of a catalog: the [`RawCatalog`] records the
//! file and its full schema, while the [`CatalogTable`] holds the loaded
//! scalar columns by name. [`SimTable`] is the typed ground-truth table the
//! matcher and comparison work with.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use fitsio::hdu::HduInfo;
use fitsio::tables::ColumnDataType;
use fitsio::FitsFile;
use nalgebra::Vector2;
use ndarray::{Array2, ArrayView2};
use thiserror::Error;

use crate::context::RunContext;
use crate::filters::Filters;
use crate::peak_table::FluxTable;

/// Errors that can occur while loading a catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog file not found: {0}")]
    NotFound(PathBuf),
    #[error("FITS I/O error: {0}")]
    FitsIo(#[from] fitsio::errors::Error),
    #[error("No binary table HDU in {0}")]
    NoTable(PathBuf),
    #[error("Missing required column '{0}'")]
    MissingColumn(String),
    #[error("Column '{0}' is not numeric")]
    NotNumeric(String),
    #[error("Column '{name}' has {found} rows, expected {expected}")]
    ColumnLength {
        name: String,
        expected: usize,
        found: usize,
    },
}

/// One field of the catalog schema
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    /// Element count per row (character width for text fields)
    pub repeat: usize,
    /// Whether the field was read into the [`CatalogTable`]
    pub loaded: bool,
}

/// The catalog as found on disk
#[derive(Debug, Clone)]
pub struct RawCatalog {
    pub path: PathBuf,
    /// Index of the HDU the table was read from
    pub hdu: usize,
    pub num_rows: usize,
    pub schema: Vec<FieldSchema>,
}

/// Values of one loaded column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Integer(Vec<i64>),
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Integer(v) => v.len(),
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Loaded scalar columns keyed by name, in schema order
#[derive(Debug, Clone, Default)]
pub struct CatalogTable {
    num_rows: usize,
    columns: Vec<(String, ColumnData)>,
}

impl CatalogTable {
    pub fn new(num_rows: usize) -> Self {
        Self {
            num_rows,
            columns: Vec::new(),
        }
    }

    /// Append a column
    ///
    /// # Errors
    /// * `CatalogError::ColumnLength` - if the column length differs from the table
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        data: ColumnData,
    ) -> Result<(), CatalogError> {
        let name = name.into();
        if data.len() != self.num_rows {
            return Err(CatalogError::ColumnLength {
                name,
                expected: self.num_rows,
                found: data.len(),
            });
        }
        self.columns.push((name, data));
        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data)
    }

    /// A numeric column by name, integer columns converted to `f64`
    ///
    /// # Errors
    /// * `CatalogError::MissingColumn` - if no such column was loaded
    /// * `CatalogError::NotNumeric` - if the column holds text
    pub fn numeric(&self, name: &str) -> Result<Cow<'_, [f64]>, CatalogError> {
        match self.column(name) {
            Some(ColumnData::Numeric(values)) => Ok(Cow::Borrowed(values)),
            Some(ColumnData::Integer(values)) => {
                Ok(Cow::Owned(values.iter().map(|&v| v as f64).collect()))
            }
            Some(ColumnData::Text(_)) => Err(CatalogError::NotNumeric(name.to_string())),
            None => Err(CatalogError::MissingColumn(name.to_string())),
        }
    }

    /// An integer column by name. Floating point columns are truncated.
    ///
    /// # Errors
    /// * `CatalogError::MissingColumn` - if no such column was loaded
    /// * `CatalogError::NotNumeric` - if the column holds text
    pub fn integer(&self, name: &str) -> Result<Cow<'_, [i64]>, CatalogError> {
        match self.column(name) {
            Some(ColumnData::Integer(values)) => Ok(Cow::Borrowed(values)),
            Some(ColumnData::Numeric(values)) => {
                Ok(Cow::Owned(values.iter().map(|&v| v as i64).collect()))
            }
            Some(ColumnData::Text(_)) => Err(CatalogError::NotNumeric(name.to_string())),
            None => Err(CatalogError::MissingColumn(name.to_string())),
        }
    }
}

/// Read a simulated-source catalog from the first binary table of a FITS file.
///
/// Scalar integer fields are read as `i64`, other scalar numeric fields as
/// `f64` and text fields as `String`. Vector-valued fields are listed in the
/// schema but not loaded. Progress is logged to the target of `ctx`.
///
/// # Errors
/// * `CatalogError::NotFound` - if `path` does not exist
/// * `CatalogError::NoTable` - if the file holds no binary table
/// * `CatalogError::FitsIo` - if cfitsio cannot read the file
pub fn load_sim_catalog<P: AsRef<Path>>(
    path: P,
    ctx: &RunContext,
) -> Result<(RawCatalog, CatalogTable), CatalogError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(CatalogError::NotFound(path.to_path_buf()));
    }

    let mut fptr = FitsFile::open(path)?;

    // Table HDUs never come first; walk extensions until one is found
    let mut hdu_idx = 1;
    let (hdu, descriptions, num_rows) = loop {
        let hdu = match fptr.hdu(hdu_idx) {
            Ok(hdu) => hdu,
            Err(_) => return Err(CatalogError::NoTable(path.to_path_buf())),
        };
        if let HduInfo::TableInfo {
            column_descriptions,
            num_rows,
        } = &hdu.info
        {
            let descriptions: Vec<(String, usize, ColumnDataType)> = column_descriptions
                .iter()
                .map(|d| (d.name.clone(), d.data_type.repeat, d.data_type.typ))
                .collect();
            let num_rows = *num_rows;
            break (hdu, descriptions, num_rows);
        }
        hdu_idx += 1;
    };

    let mut schema = Vec::with_capacity(descriptions.len());
    let mut table = CatalogTable::new(num_rows);

    for (name, repeat, typ) in descriptions {
        let data = if repeat == 1 && is_integer(typ) {
            hdu.read_col::<i64>(&mut fptr, &name)
                .ok()
                .map(ColumnData::Integer)
        } else if repeat == 1 {
            match hdu.read_col::<f64>(&mut fptr, &name) {
                Ok(values) => Some(ColumnData::Numeric(values)),
                Err(_) => hdu
                    .read_col::<String>(&mut fptr, &name)
                    .ok()
                    .map(ColumnData::Text),
            }
        } else {
            // Text fields report their width as the repeat count
            hdu.read_col::<String>(&mut fptr, &name)
                .ok()
                .filter(|values| values.len() == num_rows)
                .map(ColumnData::Text)
        };

        let loaded = match data {
            Some(data) if data.len() == num_rows => {
                table.push_column(name.clone(), data)?;
                true
            }
            _ => {
                log::debug!(
                    target: ctx.target(),
                    "Skipping catalog field '{name}' (repeat {repeat})"
                );
                false
            }
        };
        schema.push(FieldSchema {
            name,
            repeat,
            loaded,
        });
    }

    log::info!(
        target: ctx.target(),
        "Loaded {} rows and {} of {} fields from {}",
        num_rows,
        table.columns.len(),
        schema.len(),
        path.display()
    );

    let raw = RawCatalog {
        path: path.to_path_buf(),
        hdu: hdu_idx,
        num_rows,
        schema,
    };
    Ok((raw, table))
}

fn is_integer(typ: ColumnDataType) -> bool {
    matches!(
        typ,
        ColumnDataType::Byte
            | ColumnDataType::SignedByte
            | ColumnDataType::Short
            | ColumnDataType::UnsignedShort
            | ColumnDataType::Int
            | ColumnDataType::Long
            | ColumnDataType::UnsignedLong
            | ColumnDataType::LongLong
    )
}

/// A simulated (ground-truth) source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimSource {
    /// Catalog id, when the catalog has an `id` column
    pub id: Option<i64>,
    pub x: f64,
    pub y: f64,
}

impl SimSource {
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

/// Typed ground-truth table: positions and per-filter fluxes
#[derive(Debug, Clone)]
pub struct SimTable {
    filters: Filters,
    sources: Vec<SimSource>,
    flux: Array2<f64>,
}

impl SimTable {
    /// Build a table from sources and a `(sources × filters)` flux matrix
    ///
    /// # Errors
    /// * `CatalogError::ColumnLength` - if the flux matrix does not fit the sources
    pub fn new(
        filters: Filters,
        sources: Vec<SimSource>,
        flux: Array2<f64>,
    ) -> Result<Self, CatalogError> {
        if flux.dim() != (sources.len(), filters.len()) {
            return Err(CatalogError::ColumnLength {
                name: "flux".to_string(),
                expected: sources.len(),
                found: flux.nrows(),
            });
        }
        Ok(Self {
            filters,
            sources,
            flux,
        })
    }

    /// Derive the typed table from loaded catalog columns.
    ///
    /// Requires `x`, `y` and `flux_<f>` for every filter; `id` is optional.
    ///
    /// # Errors
    /// * `CatalogError::MissingColumn` / `CatalogError::NotNumeric` for absent or text columns
    pub fn from_catalog(table: &CatalogTable, filters: &Filters) -> Result<Self, CatalogError> {
        let xs = table.numeric("x")?;
        let ys = table.numeric("y")?;
        let ids = table.integer("id").ok();

        let sources = (0..table.num_rows())
            .map(|row| SimSource {
                id: ids.as_ref().map(|ids| ids[row]),
                x: xs[row],
                y: ys[row],
            })
            .collect::<Vec<_>>();

        let mut flux = Array2::from_elem((table.num_rows(), filters.len()), f64::NAN);
        for (fidx, filter) in filters.iter().enumerate() {
            let values = table.numeric(&Filters::flux_column(filter))?;
            for (row, &value) in values.iter().enumerate() {
                flux[[row, fidx]] = value;
            }
        }

        Self::new(filters.clone(), sources, flux)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sources(&self) -> &[SimSource] {
        &self.sources
    }

    pub fn source(&self, idx: usize) -> &SimSource {
        &self.sources[idx]
    }

    pub fn positions(&self) -> Vec<Vector2<f64>> {
        self.sources.iter().map(SimSource::position).collect()
    }
}

impl FluxTable for SimTable {
    fn filters(&self) -> &Filters {
        &self.filters
    }

    fn fluxes(&self) -> ArrayView2<'_, f64> {
        self.flux.view()
    }
}
