//! Export collaborators
//!
//! The pipeline hands its final product list to every configured
//! `CatalogExporter`. Two are provided: a price list CSV and a SQL script
//! that upserts the products through a stored procedure.

use chrono::{DateTime, Local};
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::ExportError;
use crate::normalizer::Product;

pub const CSV_FILE_NAME: &str = "OmPriceList.csv";
pub const SQL_FILE_NAME: &str = "OmProducts.sql";
pub const LOG_DIR_NAME: &str = "Logs";

const SQL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Consumer of the finished product list
pub trait CatalogExporter {
    fn name(&self) -> &'static str;

    fn export(&mut self, products: &[Product]) -> Result<(), ExportError>;
}

/// Where a run writes its files: `<base>/<YYYY_MM_DD>/` for exports and
/// `<base>/<YYYY_MM_DD>/Logs/log_HH_MM_SS.txt` for the log
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    started_at: DateTime<Local>,
}

impl OutputLayout {
    pub fn new(base: impl AsRef<Path>, started_at: DateTime<Local>) -> Self {
        let root = base
            .as_ref()
            .join(started_at.format("%Y_%m_%d").to_string());
        Self { root, started_at }
    }

    /// Create the output and log directories
    pub fn create(&self) -> Result<(), ExportError> {
        fs::create_dir_all(self.log_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join(LOG_DIR_NAME)
    }

    pub fn log_file_name(&self) -> String {
        format!("log_{}.txt", self.started_at.format("%H_%M_%S"))
    }

    pub fn csv_path(&self) -> PathBuf {
        self.root.join(CSV_FILE_NAME)
    }

    pub fn sql_path(&self) -> PathBuf {
        self.root.join(SQL_FILE_NAME)
    }
}

fn currency(value: Decimal) -> String {
    format!("${:.2}", value)
}

fn stock_label(in_stock: bool) -> &'static str {
    if in_stock {
        "In stock"
    } else {
        "OUT OF STOCK"
    }
}

/// Price list, one line per product, ordered by category then name
#[derive(Debug)]
pub struct CsvExporter<W> {
    writer: W,
}

impl CsvExporter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> CsvExporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn line(product: &Product) -> String {
        // Commas in free text would break the columns
        let separator = if product.size.is_empty() { "" } else { " " };
        format!(
            "{}, {}, {}{}{}, {}, {}, {}",
            product.source_product_id,
            product.source_variant_id,
            product.name.replace(',', "?"),
            separator,
            product.size.replace(',', "?"),
            currency(product.source_price),
            currency(product.display_price),
            stock_label(product.in_stock)
        )
    }
}

impl<W: Write> CatalogExporter for CsvExporter<W> {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn export(&mut self, products: &[Product]) -> Result<(), ExportError> {
        let mut ordered: Vec<&Product> = products.iter().collect();
        ordered.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.name.cmp(&b.name)));

        for product in ordered {
            writeln!(self.writer, "{}", Self::line(product))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// SQL import script.
///
/// Clears bulk products nobody has ordered, upserts every product through
/// `proc_name`, then unlists bulk products this run did not touch.
#[derive(Debug)]
pub struct SqlExporter<W> {
    writer: W,
    proc_name: String,
    run_started: String,
}

impl SqlExporter<BufWriter<File>> {
    pub fn create(
        path: impl AsRef<Path>,
        proc_name: impl Into<String>,
        started_at: DateTime<Local>,
    ) -> Result<Self, ExportError> {
        Ok(Self::new(BufWriter::new(File::create(path)?), proc_name, started_at))
    }
}

impl<W: Write> SqlExporter<W> {
    pub fn new(writer: W, proc_name: impl Into<String>, started_at: DateTime<Local>) -> Self {
        Self {
            writer,
            proc_name: proc_name.into(),
            run_started: started_at.format(SQL_TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn call(&self, product: &Product) -> String {
        format!(
            "CALL {}('{}_{}', '{}', '{}', '{}', {}, '{}', '{}', {});",
            self.proc_name,
            product.source_product_id,
            product.source_variant_id,
            quote(&product.name),
            quote(&product.description),
            quote(&product.category),
            product.display_price.normalize(),
            quote(&product.size),
            self.run_started,
            if product.in_stock { 0 } else { 1 }
        )
    }
}

/// Escape for a single-quoted SQL string literal
fn quote(value: &str) -> String {
    value.replace('\'', "''")
}

const DELETE_UNORDERED_BULK: &str = "DELETE FROM kvfc_products
WHERE IFNULL(kvfc_products.bulk_sku, '') != ''
AND kvfc_products.pvid NOT IN (
    SELECT x.pvid
    FROM (
        SELECT kvfc_products.pvid
        FROM kvfc_products
        JOIN kvfc_basket_items USING (product_id, product_version)
        WHERE IFNULL(bulk_sku, '') != ''
    ) AS x
);";

impl<W: Write> CatalogExporter for SqlExporter<W> {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn export(&mut self, products: &[Product]) -> Result<(), ExportError> {
        let mut ordered: Vec<&Product> = products.iter().collect();
        ordered.sort_by_key(|p| (p.source_product_id, p.source_variant_id));

        writeln!(self.writer, "{DELETE_UNORDERED_BULK}")?;

        for product in ordered {
            let call = self.call(product);
            writeln!(self.writer, "{call}")?;
        }

        writeln!(
            self.writer,
            "UPDATE kvfc_products SET confirmed = 0, listing_auth_type = 'unlisted' \
             WHERE producer_id IN \
             (SELECT producer_id FROM kvfc_producers WHERE IFNULL(is_bulk, 0) = 1) \
             AND modified < '{}';",
            self.run_started
        )?;
        self.writer.flush()?;
        Ok(())
    }
}
