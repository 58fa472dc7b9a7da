//! Minimal OLE Compound File Binary (CFB) probe.
//!
//! Encrypted Office Open XML workbooks are not ZIP archives: Office wraps them
//! in a compound file with an `EncryptedPackage` stream. Only the directory
//! is read here, which is enough to tell such files apart.

use crate::error::RustyAskError;
use encoding_rs::UTF_16LE;
use std::collections::HashSet;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use thiserror::Error;

const SIGNATURE: u64 = 0xE11A_B1A1_E011_CFD0;
const MAX_REG_SECT: usize = 0xFFFF_FFFB;
const HEADER_SIZE: usize = 512;
const DIRECTORY_ENTRY_SIZE: usize = 128;

/// Errors specific to Compound File Binary format parsing
#[derive(Error, Debug)]
pub enum CfbError {
    #[error("The file is corrupted or has an invalid CFB structure")]
    FileFormatError,

    #[error("Invalid OLE signature (not an office document?)")]
    OleSignatureError,

    #[error("Invalid sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),
}

/// Directory listing of a compound file
pub(crate) struct Cfb {
    names: HashSet<String>,
}

impl Cfb {
    /// Reads the header, the file allocation table and the directory chain
    pub(crate) fn new<RS: Read + Seek>(reader: &mut RS) -> Result<Cfb, RustyAskError> {
        let size = reader.seek(SeekFrom::End(0))? as usize;
        reader.seek(SeekFrom::Start(0))?;
        if size < HEADER_SIZE {
            Err(CfbError::FileFormatError)?;
        }
        let mut data = vec![0u8; size];
        reader.read_exact(&mut data)?;
        reader.seek(SeekFrom::Start(0))?;

        if read_u64(&data, 0) != SIGNATURE {
            Err(CfbError::OleSignatureError)?;
        }
        let major_version = read_u16(&data, 26);
        let sector_shift = read_u16(&data, 30);
        let sector_size = match (major_version, sector_shift) {
            (3, 0x0009) => 512,
            (4, 0x000C) => 4096,
            _ => Err(CfbError::SectorSizeError(major_version, sector_shift))?,
        };
        // Header DIFAT entries cover 109 FAT sectors, which is plenty for a
        // directory probe; larger files fall back to walking what is there.
        let mut file_allocation_table = Vec::<usize>::new();
        for offset in (76..HEADER_SIZE).step_by(4) {
            let index = read_u32(&data, offset) as usize;
            if index < MAX_REG_SECT {
                file_allocation_table.extend(sector(&data, sector_size, index)?.chunks_exact(4).map(|bytes| read_u32(bytes, 0) as usize));
            }
        }

        let mut names = HashSet::new();
        let mut index = read_u32(&data, 48) as usize;
        let mut visited = 0usize;
        while index < MAX_REG_SECT {
            for entry in sector(&data, sector_size, index)?.chunks_exact(DIRECTORY_ENTRY_SIZE) {
                let length = (read_u16(entry, 64) as usize).min(64);
                let (name, _, _) = UTF_16LE.decode(&entry[..length]);
                let name = name.trim_end_matches('\0');
                if !name.is_empty() {
                    names.insert(name.to_owned());
                }
            }
            visited += 1;
            index = match file_allocation_table.get(index) {
                Some(next) if visited <= file_allocation_table.len() => *next,
                _ => Err(CfbError::FileFormatError)?,
            };
        }
        Ok(Cfb { names })
    }

    /// Checks if a stream or storage exists in the directory
    pub(crate) fn exists(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// Returns the sector at `index`, counted after the header
fn sector(data: &[u8], sector_size: usize, index: usize) -> Result<&[u8], RustyAskError> {
    let lower = (index + 1) * sector_size;
    let upper = data.len().min(lower + sector_size);
    if lower >= upper {
        Err(CfbError::FileFormatError)?;
    }
    Ok(&data[lower..upper])
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buffer = [0u8; 8];
    buffer.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buffer)
}
