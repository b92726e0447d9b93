// src/services/products.rs

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use calamine::{Data, Reader, Xlsx};
use rust_decimal::Decimal;

use crate::{
    common::error::{AppError, AppResult},
    db::EntityStore,
    models::{
        auth::Session,
        product::{NewProduct, Product},
    },
    services::policy,
};

pub const ACCEPTED_EXTENSIONS: [&str; 2] = ["xlsx", "xlsm"];

const COL_PRODUCT_CODE: &str = "Product Code";
const COL_DESCRIPTION: &str = "Description";
const COL_COST_PRICE: &str = "Cost Price";
const COL_SALE_PRICE: &str = "Sale Price";

#[derive(Clone)]
pub struct ProductService {
    store: Arc<dyn EntityStore>,
}

impl ProductService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, search: Option<&str>) -> AppResult<Vec<Product>> {
        self.store.list_products(search).await
    }

    /// Planilha -> catálogo novo. A extensão é checada antes de qualquer parsing.
    pub async fn upload_catalog(&self, session: &Session, file_name: &str, bytes: &[u8]) -> AppResult<usize> {
        ensure_can_upload(session)?;
        ensure_spreadsheet(file_name)?;

        let products = parse_catalog(bytes)?;
        tracing::info!("Planilha '{}' lida: {} produto(s)", file_name, products.len());

        self.replace_catalog(session, products).await
    }

    /// Troca o catálogo inteiro (limpa e insere, tudo ou nada).
    pub async fn replace_catalog(&self, session: &Session, products: Vec<NewProduct>) -> AppResult<usize> {
        ensure_can_upload(session)?;

        let count = self.store.replace_products(products).await?;
        tracing::info!("📦 Catálogo substituído por '{}': {} produto(s)", session.actor.username, count);
        Ok(count)
    }
}

fn ensure_can_upload(session: &Session) -> AppResult<()> {
    if policy::can_upload_products(session.actor.role) {
        Ok(())
    } else {
        Err(AppError::permission("enviar o catálogo exige BOARD ou ADMIN"))
    }
}

pub fn ensure_spreadsheet(file_name: &str) -> AppResult<()> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase);

    match extension {
        Some(ext) if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(AppError::validation(format!(
            "'{file_name}' não é uma planilha .xlsx/.xlsm"
        ))),
    }
}

// ---
// Planilha -> produtos
// ---

pub fn parse_catalog(bytes: &[u8]) -> AppResult<Vec<NewProduct>> {
    let mut workbook = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| AppError::validation(format!("planilha ilegível: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::validation("a planilha não tem abas"))?
        .map_err(|e| AppError::validation(format!("planilha ilegível: {e}")))?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let columns = CatalogColumns::locate(header);

    Ok(rows
        .filter(|row| !row.iter().all(|cell| matches!(cell, Data::Empty)))
        .map(|row| columns.product(row))
        .collect())
}

/// Posição de cada coluna conhecida no cabeçalho (coluna ausente = valor padrão).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CatalogColumns {
    product_code: Option<usize>,
    description: Option<usize>,
    cost_price: Option<usize>,
    sale_price: Option<usize>,
}

impl CatalogColumns {
    pub fn locate(header: &[Data]) -> Self {
        let find = |name: &str| {
            header
                .iter()
                .position(|cell| cell_text(cell).trim().eq_ignore_ascii_case(name))
        };
        Self {
            product_code: find(COL_PRODUCT_CODE),
            description: find(COL_DESCRIPTION),
            cost_price: find(COL_COST_PRICE),
            sale_price: find(COL_SALE_PRICE),
        }
    }

    /// Texto ausente vira "", número ilegível vira 0.
    pub fn product(&self, row: &[Data]) -> NewProduct {
        let cell = |index: Option<usize>| index.and_then(|i| row.get(i));
        NewProduct {
            product_code: cell(self.product_code).map(cell_text).unwrap_or_default(),
            description: cell(self.description).map(cell_text).unwrap_or_default(),
            cost_price: cell(self.cost_price).map(cell_number).unwrap_or_default(),
            sale_price: cell(self.sale_price).map(cell_number).unwrap_or_default(),
        }
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(n) => n.to_string(),
        // Códigos numéricos chegam como float ("1234.0")
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
    }
}

fn cell_number(cell: &Data) -> Decimal {
    let parsed = match cell {
        Data::Int(n) => Some(Decimal::from(*n)),
        Data::Float(f) => Decimal::try_from(*f).ok(),
        Data::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|f| Decimal::try_from(f).ok()),
        _ => None,
    };
    parsed.map(|d| d.round_dp(2)).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> Data {
        Data::String(value.to_string())
    }

    #[test]
    fn only_xlsx_and_xlsm_are_accepted() {
        assert!(ensure_spreadsheet("catalogo.xlsx").is_ok());
        assert!(ensure_spreadsheet("CATALOGO.XLSM").is_ok());
        assert!(ensure_spreadsheet("catalogo.csv").is_err());
        assert!(ensure_spreadsheet("catalogo.xls").is_err());
        assert!(ensure_spreadsheet("catalogo").is_err());
    }

    #[test]
    fn maps_rows_by_header_name() {
        let header = [
            text("Sale Price"),
            text("Product Code"),
            text("Description"),
            text("Cost Price"),
        ];
        let columns = CatalogColumns::locate(&header);

        let product = columns.product(&[
            Data::Float(19.9),
            Data::Float(1234.0),
            text(" Parafuso 3mm "),
            Data::Int(7),
        ]);
        assert_eq!(product.product_code, "1234");
        assert_eq!(product.description, "Parafuso 3mm");
        assert_eq!(product.cost_price, Decimal::from(7));
        assert_eq!(product.sale_price, "19.90".parse::<Decimal>().unwrap());
    }

    #[test]
    fn bad_numbers_become_zero_and_missing_text_is_empty() {
        let header = [text("Product Code"), text("Cost Price"), text("Sale Price")];
        let columns = CatalogColumns::locate(&header);

        let product = columns.product(&[text("A-1"), text("abc"), Data::Empty]);
        assert_eq!(product.product_code, "A-1");
        assert_eq!(product.description, "");
        assert_eq!(product.cost_price, Decimal::ZERO);
        assert_eq!(product.sale_price, Decimal::ZERO);

        // Linha mais curta que o cabeçalho
        let product = columns.product(&[text("A-2")]);
        assert_eq!(product.sale_price, Decimal::ZERO);
    }

    #[test]
    fn numeric_strings_are_parsed() {
        assert_eq!(cell_number(&text(" 12.5 ")), "12.50".parse::<Decimal>().unwrap());
        assert_eq!(cell_number(&Data::Float(f64::NAN)), Decimal::ZERO);
    }

    #[test]
    fn garbage_bytes_are_a_validation_error() {
        assert!(matches!(
            parse_catalog(b"isto nao e uma planilha"),
            Err(AppError::ValidationError(_))
        ));
    }
}
