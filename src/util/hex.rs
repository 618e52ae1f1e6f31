//! Hex dump formatting for leak reports.

/// Maximum number of payload bytes included in a single dump.
pub(crate) const DUMP_LIMIT: usize = 256;

/// Format a memory region as hex dump lines (16 bytes per line, with an
/// ASCII gutter). Reads at most [`DUMP_LIMIT`] bytes.
///
/// # Safety
///
/// `addr..addr + len.min(DUMP_LIMIT)` must be readable.
pub(crate) unsafe fn dump_region(addr: usize, len: usize) -> Vec<String> {
    let len = len.min(DUMP_LIMIT);
    let mut lines = Vec::with_capacity((len + 15) / 16);
    let mut offset = 0;
    while offset < len {
        let row = (len - offset).min(16);
        let mut hex = String::with_capacity(16 * 3);
        let mut ascii = String::with_capacity(16);
        for i in 0..row {
            let byte = *((addr + offset + i) as *const u8);
            hex.push_str(&format!("{:02x} ", byte));
            ascii.push(if byte.is_ascii_graphic() { byte as char } else { '.' });
        }
        lines.push(format!("{:016x}  {:<48} {}", addr + offset, hex, ascii));
        offset += row;
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_region_rows() {
        let bytes = [0x41u8; 40];
        let lines = unsafe { dump_region(bytes.as_ptr() as usize, bytes.len()) };
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("41 41"));
        assert!(lines[0].ends_with("AAAAAAAAAAAAAAAA"));
    }

    #[test]
    fn test_dump_region_clamped() {
        let bytes = vec![0u8; 1024];
        let lines = unsafe { dump_region(bytes.as_ptr() as usize, bytes.len()) };
        assert_eq!(lines.len(), DUMP_LIMIT / 16);
    }
}
