//! CSV reader/writer construction and input decoding.
//!
//! Every file the pipelines touch goes through this module:
//!
//! - **Readers** are flexible so that rows with the wrong number of fields
//!   reach the validator (and the reject stream) instead of aborting the file.
//! - **Decoding** is strict for loading and lossy for schema sampling.
//! - **Writers** use minimal quoting so reject and export files read back as
//!   the plain CSV they came from, and accept ragged rows (rejects keep
//!   whatever field count they arrived with).

use std::{
    fs::{File, OpenOptions},
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use csv::{ByteRecord, QuoteStyle};
use encoding_rs::{Encoding, UTF_8};

use crate::error::{EtlError, Result};

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| EtlError::Config(format!("Unknown encoding '{value}'"))),
        None => Ok(UTF_8),
    }
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<BufReader<File>>> {
    let file = File::open(path).map_err(|err| EtlError::io(path, err))?;
    Ok(open_csv_reader(BufReader::new(file), delimiter))
}

/// Opens a CSV writer; `append` controls truncate-vs-append.
pub fn open_csv_writer(
    path: &Path,
    delimiter: u8,
    append: bool,
) -> Result<csv::Writer<BufWriter<File>>> {
    let file = if append {
        OpenOptions::new().create(true).append(true).open(path)
    } else {
        File::create(path)
    }
    .map_err(|err| EtlError::io(path, err))?;

    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true)
        .flexible(true);
    Ok(builder.from_writer(BufWriter::new(file)))
}

/// Strict decode of one field. Byte-order marks are not sniffed per field;
/// the reader already drops a leading UTF-8 BOM from the file.
pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Option<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}

pub fn decode_record(record: &ByteRecord, encoding: &'static Encoding) -> Option<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Decodes a record, substituting U+FFFD for malformed sequences.
pub fn decode_record_lossy(record: &ByteRecord, encoding: &'static Encoding) -> Vec<String> {
    record
        .iter()
        .map(|field| encoding.decode_without_bom_handling(field).0.into_owned())
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> std::result::Result<Vec<String>, csv::Error>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    Ok(decode_record_lossy(&headers, encoding))
}

pub fn flush_writer<W: Write>(writer: &mut csv::Writer<W>, path: &Path) -> Result<()> {
    writer.flush().map_err(|err| EtlError::io(path, err))
}
