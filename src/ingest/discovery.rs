use crate::helpers::reader::file_extension;
use crate::helpers::reader::is_remote_url;
use crate::ingest::IngestError;
use crate::spreadsheet::SUPPORTED_EXTENSIONS;
use std::path::Path;

/// Expands inputs into the list of spreadsheet files to read.
///
/// URLs and existing files pass through untouched, directories contribute their supported files
/// (not recursively), and anything else is treated as a glob pattern. Results
/// from each input are sorted; office lock files (`~$…`) are skipped.
pub fn discover<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<String>, IngestError> {
    let mut files = Vec::new();
    for input in inputs {
        let input = input.as_ref();
        let found = if is_remote_url(input) || Path::new(input).is_file() {
            vec![input.to_owned()]
        } else if Path::new(input).is_dir() {
            scan_directory(Path::new(input))?
        } else {
            expand_pattern(input)?
        };
        if found.is_empty() {
            return Err(IngestError::NoInputs(input.to_owned()));
        }
        for file in found {
            if !files.contains(&file) {
                files.push(file);
            }
        }
    }
    Ok(files)
}

fn scan_directory(directory: &Path) -> Result<Vec<String>, IngestError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let path = entry?.path();
        if path.is_file() {
            let file = path.to_string_lossy().into_owned();
            if is_candidate(&file) {
                files.push(file);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn expand_pattern(pattern: &str) -> Result<Vec<String>, IngestError> {
    let mut files: Vec<String> = glob::glob(pattern)?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Skipping unreadable path: {e}");
                None
            }
        })
        .filter(|path| path.is_file())
        .map(|path| path.to_string_lossy().into_owned())
        .filter(|file| is_candidate(file))
        .collect();
    files.sort();
    Ok(files)
}

fn is_candidate(file: &str) -> bool {
    let is_lock_file = Path::new(file)
        .file_name()
        .map(|name| name.to_string_lossy().starts_with("~$"))
        .unwrap_or(false);
    !is_lock_file && SUPPORTED_EXTENSIONS.contains(&file_extension(file).as_str())
}
