//! Value parsers for the filter flags.

use atlas_core::filter::FilterSpec;
use atlas_core::types::RowId;

fn split_assignment(raw: &str) -> Result<(&str, &str), String> {
    let (column, value) = raw.split_once('=').ok_or_else(|| format!("expected column=value, got '{raw}'"))?;
    let column = column.trim();
    if column.is_empty() { return Err(format!("missing column name in '{raw}'")); }
    Ok((column, value.trim()))
}

fn values(list: &str) -> Vec<String> {
    list.split(',').map(str::trim).filter(|v| !v.is_empty()).map(str::to_string).collect()
}

pub fn parse_one_of(raw: &str) -> Result<FilterSpec, String> {
    let (column, list) = split_assignment(raw)?;
    Ok(FilterSpec::one_of(column, values(list)))
}

pub fn parse_any_of(raw: &str) -> Result<FilterSpec, String> {
    let (column, list) = split_assignment(raw)?;
    Ok(FilterSpec::any_of(column, values(list)))
}

/// `col=min..max`; either bound may be left out.
pub fn parse_range(raw: &str) -> Result<FilterSpec, String> {
    let (column, range) = split_assignment(raw)?;
    let (min, max) = range.split_once("..").ok_or_else(|| format!("expected min..max, got '{range}'"))?;
    let bound = |s: &str| -> Result<Option<f64>, String> {
        let s = s.trim();
        if s.is_empty() { return Ok(None); }
        s.parse::<f64>().map(Some).map_err(|e| format!("bad bound '{s}': {e}"))
    };
    Ok(FilterSpec::range(column, bound(min)?, bound(max)?))
}

/// Integer-looking ids address integer keys, anything else a text key.
pub fn parse_row_id(raw: &str) -> RowId {
    let raw = raw.trim();
    raw.parse::<i64>().map_or_else(|_| RowId::from(raw), RowId::Int)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_of_splits_and_trims_values() {
        let spec = parse_one_of("condition = eczema, psoriasis,").expect("parse");
        assert_eq!(spec, FilterSpec::one_of("condition", ["eczema", "psoriasis"]));
        assert!(parse_one_of("eczema").is_err());
        assert!(parse_one_of("=eczema").is_err());
    }

    #[test]
    fn ranges_allow_open_ends() {
        assert_eq!(parse_range("age=20..40").expect("parse"), FilterSpec::range("age", Some(20.0), Some(40.0)));
        assert_eq!(parse_range("age=..40").expect("parse"), FilterSpec::range("age", None, Some(40.0)));
        assert_eq!(parse_range("age=2.5..").expect("parse"), FilterSpec::range("age", Some(2.5), None));
        assert!(parse_range("age=20-40").is_err());
        assert!(parse_range("age=x..4").is_err());
    }

    #[test]
    fn row_ids_prefer_integers() {
        assert_eq!(parse_row_id(" 42 "), RowId::Int(42));
        assert_eq!(parse_row_id("ISIC_0001"), RowId::Text("ISIC_0001".to_string()));
    }
}
