//! Catalog column schema: name, unit, printf-style format and accessor.

use super::{ReliabilityScore, SourceRecord};

/// Raw cell value before formatting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellValue {
    Int(i64),
    Float(f64),
}

impl CellValue {
    pub fn as_f64(self) -> f64 {
        match self {
            CellValue::Int(v) => v as f64,
            CellValue::Float(v) => v,
        }
    }
}

/// printf-style cell format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnFormat {
    /// `%<width>i`
    Int { width: usize },
    /// `%<width>.<precision>f`
    Fixed { width: usize, precision: usize },
    /// `%<width>.<precision>e`
    Exp { width: usize, precision: usize },
}

impl ColumnFormat {
    /// The format as a printf specifier, e.g. `%12.3e`.
    pub fn printf(&self) -> String {
        match *self {
            ColumnFormat::Int { width } => format!("%{}i", width),
            ColumnFormat::Fixed { width, precision } => format!("%{}.{}f", width, precision),
            ColumnFormat::Exp { width, precision } => format!("%{}.{}e", width, precision),
        }
    }

    pub fn width(&self) -> usize {
        match *self {
            ColumnFormat::Int { width }
            | ColumnFormat::Fixed { width, .. }
            | ColumnFormat::Exp { width, .. } => width,
        }
    }

    /// Render a value right-aligned to the column width.
    pub fn render(&self, value: CellValue) -> String {
        let text = match (*self, value) {
            (ColumnFormat::Int { .. }, CellValue::Int(v)) => v.to_string(),
            (ColumnFormat::Int { .. }, CellValue::Float(v)) => format!("{:.0}", v.trunc()),
            (ColumnFormat::Fixed { precision, .. }, v) => format!("{:.*}", precision, v.as_f64()),
            (ColumnFormat::Exp { precision, .. }, v) => format_exp(v.as_f64(), precision),
        };
        format!("{:>width$}", text, width = self.width())
    }
}

/// C-style `%.<precision>e`: mantissa, `e`, sign, at least two exponent digits.
fn format_exp(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return value.to_string().to_lowercase();
    }
    let rust = format!("{:.*e}", precision, value);
    let Some((mantissa, exponent)) = rust.split_once('e') else {
        return rust;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{}e{}{:02}", mantissa, sign, exponent.unsigned_abs())
}

/// One catalog column.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: &'static str,
    pub unit: String,
    pub format: ColumnFormat,
    accessor: fn(&SourceRecord) -> CellValue,
}

impl Column {
    pub fn new(
        name: &'static str,
        unit: impl Into<String>,
        format: ColumnFormat,
        accessor: fn(&SourceRecord) -> CellValue,
    ) -> Self {
        Self {
            name,
            unit: unit.into(),
            format,
            accessor,
        }
    }

    #[inline]
    pub fn value(&self, record: &SourceRecord) -> CellValue {
        (self.accessor)(record)
    }

    pub fn format_value(&self, record: &SourceRecord) -> String {
        self.format.render(self.value(record))
    }
}

const ID: ColumnFormat = ColumnFormat::Int { width: 10 };
const POSITION: ColumnFormat = ColumnFormat::Fixed {
    width: 10,
    precision: 3,
};
const BOUND: ColumnFormat = ColumnFormat::Int { width: 7 };
const COUNT: ColumnFormat = ColumnFormat::Int { width: 8 };
const FLUX: ColumnFormat = ColumnFormat::Exp {
    width: 12,
    precision: 3,
};
const RELIABILITY: ColumnFormat = ColumnFormat::Fixed {
    width: 12,
    precision: 6,
};

fn int(v: usize) -> CellValue {
    CellValue::Int(v as i64)
}

/// Columns measured by the linker.
pub(super) fn base_columns(data_unit: &str) -> Vec<Column> {
    vec![
        Column::new("ID", "-", ID, |r| CellValue::Int(r.id as i64)),
        Column::new("Xg", "pix", POSITION, |r| CellValue::Float(r.geometric_center[0])),
        Column::new("Yg", "pix", POSITION, |r| CellValue::Float(r.geometric_center[1])),
        Column::new("Zg", "chan", POSITION, |r| CellValue::Float(r.geometric_center[2])),
        Column::new("Xm", "pix", POSITION, |r| CellValue::Float(r.flux_center[0])),
        Column::new("Ym", "pix", POSITION, |r| CellValue::Float(r.flux_center[1])),
        Column::new("Zm", "chan", POSITION, |r| CellValue::Float(r.flux_center[2])),
        Column::new("Xmin", "pix", BOUND, |r| int(r.bbox.x_min)),
        Column::new("Xmax", "pix", BOUND, |r| int(r.bbox.x_max)),
        Column::new("Ymin", "pix", BOUND, |r| int(r.bbox.y_min)),
        Column::new("Ymax", "pix", BOUND, |r| int(r.bbox.y_max)),
        Column::new("Zmin", "chan", BOUND, |r| int(r.bbox.z_min)),
        Column::new("Zmax", "chan", BOUND, |r| int(r.bbox.z_max)),
        Column::new("NRvox", "-", COUNT, |r| int(r.n_voxels)),
        Column::new("Fmin", data_unit, FLUX, |r| CellValue::Float(r.flux_min)),
        Column::new("Fmax", data_unit, FLUX, |r| CellValue::Float(r.flux_max)),
        Column::new("Ftot", data_unit, FLUX, |r| CellValue::Float(r.flux_total)),
    ]
}

/// Identifier before renumbering.
pub(super) fn old_id_column() -> Column {
    Column::new("ID_old", "-", ID, |r| {
        CellValue::Int(r.old_id.map_or(-1, |id| id as i64))
    })
}

fn score(r: &SourceRecord) -> ReliabilityScore {
    r.reliability.unwrap_or_default()
}

/// Columns added by reliability estimation.
pub(super) fn reliability_columns() -> Vec<Column> {
    vec![
        Column::new("NRpos", "-", FLUX, |r| CellValue::Float(score(r).n_pos)),
        Column::new("NRneg", "-", FLUX, |r| CellValue::Float(score(r).n_neg)),
        Column::new("Rel", "-", RELIABILITY, |r| CellValue::Float(score(r).reliability)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printf_specifiers() {
        assert_eq!(ID.printf(), "%10i");
        assert_eq!(POSITION.printf(), "%10.3f");
        assert_eq!(FLUX.printf(), "%12.3e");
        assert_eq!(RELIABILITY.printf(), "%12.6f");
    }

    #[test]
    fn test_c_style_exponent() {
        assert_eq!(format_exp(1234.4, 3), "1.234e+03");
        assert_eq!(format_exp(-0.00012, 2), "-1.20e-04");
        assert_eq!(format_exp(0.0, 3), "0.000e+00");
        assert_eq!(format_exp(f64::NAN, 3), "nan");
    }

    #[test]
    fn test_render_right_aligned() {
        assert_eq!(ID.render(CellValue::Int(42)), "        42");
        assert_eq!(POSITION.render(CellValue::Float(3.14159)), "     3.142");
        assert_eq!(FLUX.render(CellValue::Float(2.5e-3)), "   2.500e-03");
    }
}
