use std::io::{BufRead, BufReader, Read};

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    models::POSTAL_CODE_LENGTH,
};

/**
 * A data row with every field present after trimming.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostalCodeRecord {
    /**
     * Postal code left-padded to four digits.
     */
    pub code: String,
    pub city_name: String,
    pub county_name: String,
}

/**
 * One data row of the import file.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRow {
    Complete(PostalCodeRecord),
    /**
     * At least one field was empty or missing.
     */
    Incomplete { line: u64 },
}

/**
 * Reads `code,city_name,county_name` rows from a CSV stream.
 *
 * The first `header_lines` physical lines are discarded without inspection, in
 * whatever encoding they are.
 *
 * Reading is blocking `std::io`. The importer runs from the CLI and is not meant
 * for the HTTP workers.
 */
pub struct PostalCodeSource<R: Read> {
    records: StringRecordsIntoIter<BufReader<R>>,
    header_lines: u64,
}

impl<R: Read> PostalCodeSource<R> {
    /**
     * Creates a source over the reader, consuming the header lines.
     *
     * # Arguments
     * `reader`: The CSV input.
     * `header_lines`: Number of leading lines to discard.
     */
    pub fn new(reader: R, header_lines: usize) -> Result<Self, ApplicationError> {
        let mut reader = BufReader::new(reader);
        let mut discarded = Vec::new();
        for _ in 0..header_lines {
            discarded.clear();
            reader.read_until(b'\n', &mut discarded).map_err(|err| ApplicationError::new(ErrorType::Import, format!("Failed to read header line: {err}")))?;
        }
        let records = ReaderBuilder::new().has_headers(false).flexible(true).from_reader(reader).into_records();
        Ok(PostalCodeSource { records, header_lines: header_lines as u64 })
    }

    /**
     * Reads the next data row.
     *
     * # Returns
     * None at end of input, or an import error for unreadable CSV and malformed postal codes.
     */
    pub fn next_row(&mut self) -> Result<Option<SourceRow>, ApplicationError> {
        let Some(record) = self.records.next() else {
            return Ok(None);
        };
        let record = record.map_err(|err| ApplicationError::new(ErrorType::Import, format!("Failed to read CSV record: {err}")))?;
        let line = record.position().map_or(0, |position| position.line()) + self.header_lines;
        parse_record(&record, line).map(Some)
    }
}

/**
 * Trims the three columns and normalizes the postal code.
 */
fn parse_record(record: &StringRecord, line: u64) -> Result<SourceRow, ApplicationError> {
    let field = |index: usize| record.get(index).map(str::trim).unwrap_or_default();
    let (code, city_name, county_name) = (field(0), field(1), field(2));
    if code.is_empty() || city_name.is_empty() || county_name.is_empty() {
        return Ok(SourceRow::Incomplete { line });
    }
    let code = normalize_postal_code(code).ok_or_else(|| ApplicationError::new(ErrorType::Import, format!("Malformed postal code '{code}' on line {line}")))?;
    Ok(SourceRow::Complete(PostalCodeRecord { code, city_name: city_name.to_string(), county_name: county_name.to_string() }))
}

/**
 * Left-pads a trimmed code of one to four ASCII digits with zeros.
 *
 * # Returns
 * The four digit code, or None if the code is longer or holds anything but digits.
 */
pub fn normalize_postal_code(code: &str) -> Option<String> {
    if code.is_empty() || code.len() > POSTAL_CODE_LENGTH || !code.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    Some(format!("{code:0>width$}", width = POSTAL_CODE_LENGTH))
}

#[cfg(test)]
mod test {
    use super::*;

    fn collect(input: &str, header_lines: usize) -> Result<Vec<SourceRow>, ApplicationError> {
        let mut source = PostalCodeSource::new(input.as_bytes(), header_lines)?;
        let mut rows = Vec::new();
        while let Some(row) = source.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    fn complete(code: &str, city_name: &str, county_name: &str) -> SourceRow {
        SourceRow::Complete(PostalCodeRecord { code: code.to_string(), city_name: city_name.to_string(), county_name: county_name.to_string() })
    }

    #[test]
    fn test_normalize_postal_code_pads() {
        assert_eq!(normalize_postal_code("8128"), Some("8128".to_string()));
        assert_eq!(normalize_postal_code("621"), Some("0621".to_string()));
        assert_eq!(normalize_postal_code("7"), Some("0007".to_string()));
    }

    #[test]
    fn test_normalize_postal_code_rejects_malformed() {
        assert_eq!(normalize_postal_code(""), None);
        assert_eq!(normalize_postal_code("12345"), None);
        assert_eq!(normalize_postal_code("H-1011"), None);
    }

    #[test]
    fn test_latin2_header_is_discarded() {
        let input: &[u8] = b"Ir\xe1ny\xedt\xf3sz\xe1m,Telep\xfcl\xe9s,Megye\n8128,Aba,Fej\xc3\xa9r\n";
        let mut source = PostalCodeSource::new(input, 1).unwrap();
        assert_eq!(source.next_row().unwrap(), Some(complete("8128", "Aba", "Fejér")));
        assert_eq!(source.next_row().unwrap(), None);
    }

    #[test]
    fn test_header_line_is_discarded_unconditionally() {
        let rows = collect("8128,Aba,Fejér\n2694,Cserháthaláp,Nógrád\n", 1).unwrap();
        assert_eq!(rows, vec![complete("2694", "Cserháthaláp", "Nógrád")]);
    }

    #[test]
    fn test_fields_are_trimmed() {
        let rows = collect("Irányítószám,Település,Megye\n  8128 , Aba ,  Fejér \n", 1).unwrap();
        assert_eq!(rows, vec![complete("8128", "Aba", "Fejér")]);
    }

    #[test]
    fn test_blank_and_short_rows_are_incomplete() {
        let rows = collect("code,city,county\n,,\n1011,Budapest\n 2000 , ,Pest\n", 1).unwrap();
        assert_eq!(rows, vec![SourceRow::Incomplete { line: 2 }, SourceRow::Incomplete { line: 3 }, SourceRow::Incomplete { line: 4 }]);
    }

    #[test]
    fn test_quoted_fields() {
        let rows = collect("code,city,county\n\"7621\",\"Pécs\",\"Baranya\"\n", 1).unwrap();
        assert_eq!(rows, vec![complete("7621", "Pécs", "Baranya")]);
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let rows = collect("code,city,county\n7621,Pécs,Baranya,HU\n", 1).unwrap();
        assert_eq!(rows, vec![complete("7621", "Pécs", "Baranya")]);
    }

    #[test]
    fn test_malformed_code_is_an_error_with_line() {
        let error = collect("code,city,county\n7621,Pécs,Baranya\n76A1,Pécs,Baranya\n", 1).unwrap_err();
        assert_eq!(error.error_type, ErrorType::Import);
        assert!(error.message.contains("line 3"));
    }

    #[test]
    fn test_two_header_lines() {
        let rows = collect("code,city,county\n,,\n8128,Aba,Fejér\n", 2).unwrap();
        assert_eq!(rows, vec![complete("8128", "Aba", "Fejér")]);
    }
}
