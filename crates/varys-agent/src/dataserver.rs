//! The bulk-data half of the agent: answers `GetRequest`s per §6.2 for `FAKE`
//! and `ONDISK` flows. `INMEMORY` flows are never routed here — the client
//! resolves `originHost:originPort` straight to the publishing client's own
//! in-process data server.

use memmap2::MmapOptions;

use varys_core::{DataType, FlowDescription, Result, VarysError};

/// Produces the deterministic `FAKE` byte pattern: `b[i] = i mod 256`.
pub fn fake_bytes(size_in_bytes: u64) -> Vec<u8> {
    (0..size_in_bytes).map(|i| (i % 256) as u8).collect()
}

/// Reads `length` bytes starting at `offset` from `path_to_file` via a
/// read-only memory map, rejecting any range that would run past EOF.
pub fn on_disk_bytes(path_to_file: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
    let file = std::fs::File::open(path_to_file)
        .map_err(|e| VarysError::Connectivity(format!("opening {path_to_file}: {e}")))?;
    let file_len = file
        .metadata()
        .map_err(|e| VarysError::Connectivity(format!("stat {path_to_file}: {e}")))?
        .len();
    let end = offset
        .checked_add(length)
        .ok_or_else(|| VarysError::Protocol("ondisk range overflows u64".into()))?;
    if end > file_len {
        return Err(VarysError::Protocol(format!(
            "ondisk read [{offset}, {end}) exceeds file length {file_len} for {path_to_file}"
        )));
    }
    if length == 0 {
        return Ok(Vec::new());
    }
    // Safety: the mapping is read-only and scoped to this call; we never hold
    // it across a mutation of the underlying file from this process.
    let mmap = unsafe {
        MmapOptions::new()
            .offset(offset)
            .len(length as usize)
            .map(&file)
            .map_err(|e| VarysError::Connectivity(format!("mmap {path_to_file}: {e}")))?
    };
    Ok(mmap.to_vec())
}

/// Resolves the bytes for one `GetRequest`, per the data types the agent
/// itself is responsible for serving.
pub fn serve_bytes(desc: &FlowDescription) -> Result<Option<Vec<u8>>> {
    match desc.data_type {
        DataType::Fake => Ok(Some(fake_bytes(desc.size_in_bytes))),
        DataType::OnDisk => {
            let file = desc.file.as_ref().ok_or_else(|| {
                VarysError::Protocol("ondisk flow descriptor missing file location".into())
            })?;
            on_disk_bytes(&file.path_to_file, file.offset, file.length).map(Some)
        }
        DataType::InMemory => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use varys_core::{CoflowId, DataIdentifier, FileLocation, FlowId};

    fn id() -> DataIdentifier {
        DataIdentifier::new(CoflowId::new("cf"), FlowId::new("f"))
    }

    #[test]
    fn fake_pattern_wraps_at_256() {
        let bytes = fake_bytes(300);
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[255], 255);
        assert_eq!(bytes[256], 0);
        assert_eq!(bytes.len(), 300);
    }

    #[test]
    fn ondisk_reads_requested_slice() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        file.flush().unwrap();
        let bytes = on_disk_bytes(file.path().to_str().unwrap(), 3, 4).unwrap();
        assert_eq!(bytes, b"3456");
    }

    #[test]
    fn ondisk_rejects_range_past_eof() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"short").unwrap();
        file.flush().unwrap();
        let result = on_disk_bytes(file.path().to_str().unwrap(), 0, 100);
        assert!(matches!(result, Err(VarysError::Protocol(_))));
    }

    #[test]
    fn serve_bytes_dispatches_by_data_type() {
        let fake = FlowDescription::fake(id(), 10, 1, "h", 9000);
        assert_eq!(serve_bytes(&fake).unwrap().unwrap().len(), 10);

        let in_memory = FlowDescription::in_memory(id(), 10, 1, "h", 9000, None);
        assert_eq!(serve_bytes(&in_memory).unwrap(), None);
    }

    #[test]
    fn serve_bytes_ondisk_reads_the_backing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();
        let loc = FileLocation { path_to_file: file.path().to_str().unwrap().to_string(), offset: 6, length: 5 };
        let desc = FlowDescription::on_disk(id(), 1, "h", 9000, loc);
        assert_eq!(serve_bytes(&desc).unwrap().unwrap(), b"world");
    }
}
