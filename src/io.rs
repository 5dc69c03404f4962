use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::{debug, warn};

use crate::constants::*;
use crate::simulator::ProcessImage;

/// Read the binary process stream: per record a little-endian `i32` pid, an
/// `i32` reference count, then that many single-byte page numbers. A clean
/// end of input between records terminates the stream.
///
/// Page numbers are validated here so the simulator only ever sees
/// references inside the virtual address space. At most [`MAX_PROCESSES`]
/// records are consumed; anything beyond that is left unread.
pub fn load_processes<R: Read>(reader: &mut R) -> Result<Vec<ProcessImage>, String> {
    let mut images = Vec::new();

    while images.len() < MAX_PROCESSES {
        let pid = match read_i32(reader)? {
            Some(pid) => pid,
            None => return Ok(images),
        };
        let ref_len = read_i32(reader)?
            .ok_or_else(|| format!("process {}: input ends before the reference count", pid))?;
        if ref_len < 0 {
            return Err(format!("process {}: negative reference count {}", pid, ref_len));
        }
        let ref_len = ref_len as usize;
        if ref_len > MAX_REFERENCES {
            return Err(format!(
                "process {}: {} references exceed the limit of {}",
                pid, ref_len, MAX_REFERENCES
            ));
        }

        let mut references = vec![0u8; ref_len];
        reader
            .read_exact(&mut references)
            .map_err(|e| format!("process {}: failed to read {} references: {}", pid, ref_len, e))?;
        for &vpn in &references {
            if vpn as usize >= VAS_PAGES {
                return Err(format!(
                    "process {}: page number {} out of range (max {})",
                    pid,
                    vpn,
                    VAS_PAGES - 1
                ));
            }
        }

        debug!("loaded process {} with {} references", pid, ref_len);
        images.push(ProcessImage { pid, references });
    }

    // The capacity bound is part of this loader's contract; extra records
    // stay unread rather than failing the whole load
    if read_i32(reader)?.is_some() {
        warn!("input holds more than {} processes; the rest are ignored", MAX_PROCESSES);
    }
    Ok(images)
}

/// Convenience wrapper for loading from a file path
pub fn load_processes_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<ProcessImage>, String> {
    let file = File::open(path.as_ref())
        .map_err(|e| format!("failed to open {}: {}", path.as_ref().display(), e))?;
    load_processes(&mut BufReader::new(file))
}

/// Read one little-endian `i32`, distinguishing clean end-of-input (`None`)
/// from a value truncated mid-field (error)
fn read_i32<R: Read>(reader: &mut R) -> Result<Option<i32>, String> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader
            .read(&mut buf[filled..])
            .map_err(|e| format!("read error: {}", e))?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err("input ends in the middle of a record field".to_string());
        }
        filled += n;
    }
    Ok(Some(i32::from_le_bytes(buf)))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encode one record the way the loader expects it
    fn record(pid: i32, references: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&pid.to_le_bytes());
        bytes.extend_from_slice(&(references.len() as i32).to_le_bytes());
        bytes.extend_from_slice(references);
        bytes
    }

    #[test]
    fn test_loads_two_records() {
        let mut input = record(3, &[0, 5, 63]);
        input.extend(record(7, &[8]));

        let images = load_processes(&mut input.as_slice()).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].pid, 3);
        assert_eq!(images[0].references, vec![0, 5, 63]);
        assert_eq!(images[1].pid, 7);
        assert_eq!(images[1].references, vec![8]);
    }

    #[test]
    fn test_empty_input_is_a_clean_end() {
        let mut empty: &[u8] = &[];
        let images = load_processes(&mut empty).unwrap();
        assert!(images.is_empty());
    }

    #[test]
    fn test_zero_references_is_valid() {
        let input = record(1, &[]);
        let images = load_processes(&mut input.as_slice()).unwrap();
        assert_eq!(images.len(), 1);
        assert!(images[0].references.is_empty());
    }

    #[test]
    fn test_truncated_header_is_rejected() {
        // Three bytes of a pid, then nothing
        let input = [1u8, 0, 0];
        let err = load_processes(&mut input.as_slice()).unwrap_err();
        assert!(err.contains("middle of a record field"), "got: {}", err);
    }

    #[test]
    fn test_missing_reference_count_is_rejected() {
        let input = 5i32.to_le_bytes();
        let err = load_processes(&mut input.as_slice()).unwrap_err();
        assert!(err.contains("before the reference count"), "got: {}", err);
    }

    #[test]
    fn test_truncated_references_are_rejected() {
        let mut input = Vec::new();
        input.extend_from_slice(&2i32.to_le_bytes());
        input.extend_from_slice(&4i32.to_le_bytes());
        input.extend_from_slice(&[1, 2]); // two of the four promised bytes

        let err = load_processes(&mut input.as_slice()).unwrap_err();
        assert!(err.contains("failed to read 4 references"), "got: {}", err);
    }

    #[test]
    fn test_negative_reference_count_is_rejected() {
        let mut input = Vec::new();
        input.extend_from_slice(&2i32.to_le_bytes());
        input.extend_from_slice(&(-1i32).to_le_bytes());

        let err = load_processes(&mut input.as_slice()).unwrap_err();
        assert!(err.contains("negative reference count"), "got: {}", err);
    }

    #[test]
    fn test_oversized_reference_count_is_rejected() {
        let mut input = Vec::new();
        input.extend_from_slice(&2i32.to_le_bytes());
        input.extend_from_slice(&((MAX_REFERENCES as i32) + 1).to_le_bytes());

        let err = load_processes(&mut input.as_slice()).unwrap_err();
        assert!(err.contains("exceed the limit"), "got: {}", err);
    }

    #[test]
    fn test_out_of_range_page_number_is_rejected() {
        let input = record(9, &[0, VAS_PAGES as u8, 1]);
        let err = load_processes(&mut input.as_slice()).unwrap_err();
        assert!(err.contains("page number 64 out of range"), "got: {}", err);
    }

    #[test]
    fn test_loader_stops_at_the_process_cap() {
        let mut input = Vec::new();
        for pid in 0..(MAX_PROCESSES as i32 + 2) {
            input.extend(record(pid, &[1, 2]));
        }

        let images = load_processes(&mut input.as_slice()).unwrap();
        assert_eq!(images.len(), MAX_PROCESSES);
        assert_eq!(images.last().unwrap().pid, MAX_PROCESSES as i32 - 1);
    }

    #[test]
    fn test_negative_pid_is_passed_through() {
        // Identities are opaque; nothing forbids a negative one
        let input = record(-5, &[0]);
        let images = load_processes(&mut input.as_slice()).unwrap();
        assert_eq!(images[0].pid, -5);
    }
}
