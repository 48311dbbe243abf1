/// Formats `buffer[start..=end]` as 16-byte hexdump lines with an ASCII column.
pub fn hexdump(buffer: &[u8], start: usize, end: usize) -> String {
    let end = end.min(buffer.len().saturating_sub(1));
    let mut str = String::new();
    let mut addr = start;
    while addr <= end && addr < buffer.len() {
        let row_end = (addr + 15).min(end);
        let row = &buffer[addr..=row_end];

        let bytes: Vec<String> = row.iter().map(|b| format!("{:02x}", b)).collect();
        let chars: String = row
            .iter()
            .map(|&b| {
                let c = b as char;
                if c.is_ascii_graphic() || c == ' ' {
                    c
                } else {
                    '.'
                }
            })
            .collect();

        str.push_str(&format!("{:04x}: {:<47} {}\n", addr, bytes.join(" "), chars));
        addr = row_end + 1;
    }

    str
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hexdump() {
        let mut buffer = vec![0u8; 0x20];
        buffer[0x10..0x14].copy_from_slice(b"NIC!");

        let dump = hexdump(&buffer, 0x10, 0x13);
        assert_eq!(dump, format!("0010: {:<47} NIC!\n", "4e 49 43 21"));

        let dump = hexdump(&buffer, 0, 0xFFFF);
        assert_eq!(dump.lines().count(), 2);
    }
}
