use crate::error::RustyAskError;
use std::fs::File;
use std::io::BufReader;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::path::Path;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum UnifiedReaderError {
    #[error("No data from remote file: '{0}'")]
    RemoteFileNoDataError(String),
}

/// A reader over either a local file or a downloaded remote file
pub(crate) enum UnifiedReader {
    /// Local file reader
    Local(BufReader<File>),
    /// Remote URL reader (in-memory buffer)
    Remote(Cursor<Vec<u8>>),
}

impl UnifiedReader {
    /// Opens a file from either a local path or a remote URL.
    /// Remote files are fetched whole through DuckDB's `read_blob`, which
    /// handles http(s), s3, gs and hf URLs along with their credentials.
    pub(crate) fn new(file_name: &str) -> Result<UnifiedReader, RustyAskError> {
        if is_remote_url(file_name) {
            Self::read_blob_with_duckdb(file_name)
        } else {
            let file = File::open(local_path(file_name))?;
            Ok(UnifiedReader::Local(BufReader::new(file)))
        }
    }

    /// Reads the whole content into memory
    pub(crate) fn into_bytes(self) -> Result<Vec<u8>, RustyAskError> {
        match self {
            UnifiedReader::Local(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
            UnifiedReader::Remote(cursor) => Ok(cursor.into_inner()),
        }
    }

    fn read_blob_with_duckdb(file_name: &str) -> Result<UnifiedReader, RustyAskError> {
        let connection = duckdb::Connection::open_in_memory()?;
        let result: Result<Vec<u8>, _> =
            connection.query_row("SELECT content FROM read_blob(?)", [file_name], |row| row.get(0));
        connection.close().map_err(|(_, e)| e)?;

        let bytes = result?;
        if bytes.is_empty() {
            Err(UnifiedReaderError::RemoteFileNoDataError(file_name.to_owned()))?;
        }
        Ok(UnifiedReader::Remote(Cursor::new(bytes)))
    }
}

impl Read for UnifiedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            UnifiedReader::Local(reader) => reader.read(buf),
            UnifiedReader::Remote(reader) => reader.read(buf),
        }
    }
}

impl Seek for UnifiedReader {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        match self {
            UnifiedReader::Local(reader) => reader.seek(pos),
            UnifiedReader::Remote(reader) => reader.seek(pos),
        }
    }
}

/// Checks if a file name is a remote URL (anything with a scheme other than `file`)
pub(crate) fn is_remote_url(file_name: &str) -> bool {
    match Url::parse(file_name) {
        // Single-letter schemes are Windows drive letters
        Ok(url) => url.scheme() != "file" && url.scheme().len() > 1,
        Err(_) => false,
    }
}

/// Resolves `file://` URLs to plain paths
fn local_path(file_name: &str) -> String {
    Url::parse(file_name)
        .ok()
        .filter(|url| url.scheme() == "file")
        .and_then(|url| url.to_file_path().ok())
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_owned())
}

/// Last path segment of a local path or URL, without query string
fn file_name_part(file_name: &str) -> String {
    let path = match Url::parse(file_name) {
        Ok(url) if url.scheme().len() > 1 => url.path().to_owned(),
        _ => file_name.to_owned(),
    };
    path.rsplit(['/', '\\']).next().unwrap_or_default().to_owned()
}

/// Lower-cased extension of a local path or URL
pub(crate) fn file_extension(file_name: &str) -> String {
    Path::new(&file_name_part(file_name))
        .extension()
        .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// File stem of a local path or URL
pub(crate) fn file_stem(file_name: &str) -> String {
    Path::new(&file_name_part(file_name))
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
