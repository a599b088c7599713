//! Gzip TSV reader.
//!
//! Loads a whole input file into memory: decompress, then split into rows
//! with a tab delimiter. Rows are returned as raw bytes; decoding and
//! validation belong to the parser, so one bad row never fails the file.

use csv::{ByteRecord, ReaderBuilder};
use snafu::prelude::*;
use std::io::Read;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

use crate::config::CompressionFormat;
use crate::emit;
use crate::error::{GzipDecompressionSnafu, OpenFileSnafu, ReaderError, TableReadSnafu};
use crate::metrics::events::{BytesRead, FileDecompressionCompleted};

/// Rows of one input file.
#[derive(Debug)]
pub struct ReadResult {
    pub rows: Vec<ByteRecord>,
}

/// Reader for tab-separated input files.
#[derive(Debug, Clone, Copy)]
pub struct TsvReader {
    compression: CompressionFormat,
}

impl TsvReader {
    pub fn new(compression: CompressionFormat) -> Self {
        Self { compression }
    }

    /// Read and decompress a file from disk, returning every row.
    pub fn read_path(&self, path: &Path) -> Result<ReadResult, ReaderError> {
        let display = path.display().to_string();
        let compressed = std::fs::read(path).context(OpenFileSnafu {
            path: display.clone(),
        })?;
        self.read(&compressed, &display)
    }

    /// Decompress raw file bytes and split them into rows.
    pub fn read(&self, data: &[u8], path: &str) -> Result<ReadResult, ReaderError> {
        emit!(BytesRead {
            bytes: data.len() as u64,
        });

        let decompress_start = Instant::now();
        let decompressed = match self.compression {
            CompressionFormat::Gzip => {
                let mut decoder = flate2::read::GzDecoder::new(data);
                let mut buf = Vec::new();
                decoder
                    .read_to_end(&mut buf)
                    .context(GzipDecompressionSnafu {
                        path: path.to_string(),
                    })?;
                buf
            }
            CompressionFormat::None => data.to_vec(),
        };
        emit!(FileDecompressionCompleted {
            duration: decompress_start.elapsed()
        });

        debug!(
            "Decompressed {} -> {} bytes for {}",
            data.len(),
            decompressed.len(),
            path
        );

        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(decompressed.as_slice());

        let rows = reader
            .byte_records()
            .collect::<Result<Vec<_>, _>>()
            .context(TableReadSnafu {
                path: path.to_string(),
            })?;

        debug!("Read {} rows from {}", rows.len(), path);

        Ok(ReadResult { rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_reads_gzip_tsv() {
        let data = gzip(b"idfa\tid1\t1.0\t2.0\t1,2\ngaid\tid2\t3.0\t4.0\t3\n");
        let result = TsvReader::new(CompressionFormat::Gzip)
            .read(&data, "test.tsv.gz")
            .unwrap();

        assert_eq!(result.rows.len(), 2);
        assert_eq!(&result.rows[0][0], b"idfa");
        assert_eq!(&result.rows[1][4], b"3");
    }

    #[test]
    fn test_ragged_rows_and_quotes_are_kept_raw() {
        let data = gzip(b"idfa\tid1\nidfa\t\"quoted\t1\t2\t3\n");
        let result = TsvReader::new(CompressionFormat::Gzip)
            .read(&data, "ragged.tsv.gz")
            .unwrap();

        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].len(), 2);
        assert_eq!(&result.rows[1][1], b"\"quoted");
    }

    #[test]
    fn test_plain_input() {
        let result = TsvReader::new(CompressionFormat::None)
            .read(b"dvid\tid\t0\t0\t\n", "plain.tsv")
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert!(result.rows[0][4].is_empty());
    }

    #[test]
    fn test_invalid_utf8_row_is_kept_raw() {
        let data = gzip(
            b"idfa\tid1\t1.0\t2.0\t1\n\
              idfa\t\xff\xfe\t1.0\t2.0\t1\n\
              gaid\tid3\t1.0\t2.0\t3\n",
        );
        let result = TsvReader::new(CompressionFormat::Gzip)
            .read(&data, "mixed.tsv.gz")
            .unwrap();

        assert_eq!(result.rows.len(), 3);
        assert_eq!(&result.rows[1][1], b"\xff\xfe");
        assert_eq!(&result.rows[2][0], b"gaid");
    }

    #[test]
    fn test_corrupt_gzip_is_error() {
        let err = TsvReader::new(CompressionFormat::Gzip)
            .read(b"definitely not gzip", "bad.tsv.gz")
            .unwrap_err();
        assert!(matches!(err, ReaderError::GzipDecompression { .. }));
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = TsvReader::new(CompressionFormat::Gzip)
            .read_path(Path::new("/nonexistent/memc-load/input.tsv.gz"))
            .unwrap_err();
        assert!(matches!(err, ReaderError::OpenFile { .. }));
    }
}
