use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::OnceLock;

use regex::Regex;

use crate::err::DetourError;

#[derive(Debug, PartialEq)]
struct MemoryBlock {
    start: u64,
    end: u64,
    writable: bool,
}

fn maps_line_regex() -> Result<&'static Regex, DetourError> {
    static RE: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = RE.get() {
        return Ok(re);
    }
    let re = Regex::new(r"^([0-9a-f]+)-([0-9a-f]+)\s+[r-]([w-])[x-][ps]")
        .map_err(|_| DetourError::MemoryLayoutFormat)?;
    Ok(RE.get_or_init(|| re))
}

impl MemoryBlock {
    fn from_line(s: &str) -> Result<Self, DetourError> {
        let caps = maps_line_regex()?
            .captures(s)
            .ok_or(DetourError::MemoryLayoutFormat)?;
        let parse = |i: usize| {
            u64::from_str_radix(&caps[i], 16).map_err(|_| DetourError::MemoryLayoutFormat)
        };
        Ok(Self {
            start: parse(1)?,
            end: parse(2)?,
            writable: &caps[3] == "w",
        })
    }
}

fn read_self_mem_layout() -> Result<Vec<MemoryBlock>, DetourError> {
    let maps = File::open("/proc/self/maps")?;
    let reader = BufReader::new(maps);

    reader
        .lines()
        .map(|line| line.map_err(DetourError::from).and_then(|s| MemoryBlock::from_line(&s)))
        .collect()
}

// Blocks are sorted and non-overlapping, as the kernel lists them.
fn covered(blocks: &[MemoryBlock], start: u64, end: u64) -> bool {
    let mut cur = start;
    while cur < end {
        match blocks.iter().find(|b| b.start <= cur && cur < b.end) {
            Some(b) if b.writable => cur = b.end,
            _ => return false,
        }
    }
    true
}

pub(super) fn is_writable(addr: usize, len: usize) -> Result<bool, DetourError> {
    let blocks = read_self_mem_layout()?;
    Ok(covered(&blocks, addr as u64, (addr + len) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_maps_line() {
        let b = MemoryBlock::from_line(
            "7f3a1c000000-7f3a1c021000 rw-p 00000000 00:00 0 ",
        )
        .unwrap();
        assert_eq!(
            b,
            MemoryBlock {
                start: 0x7f3a_1c00_0000,
                end: 0x7f3a_1c02_1000,
                writable: true
            }
        );
        let b = MemoryBlock::from_line(
            "55d0c8a00000-55d0c8a2b000 r-xp 00002000 08:01 1311 /usr/bin/cat",
        )
        .unwrap();
        assert!(!b.writable);
        assert_eq!(b.start, 0x55d0_c8a0_0000);
    }

    #[test]
    fn test_parse_bad_line() {
        assert!(matches!(
            MemoryBlock::from_line("not a mapping"),
            Err(DetourError::MemoryLayoutFormat)
        ));
    }

    #[test]
    fn test_covered_across_blocks() {
        let blocks = [
            MemoryBlock {
                start: 0x1000,
                end: 0x2000,
                writable: true,
            },
            MemoryBlock {
                start: 0x2000,
                end: 0x3000,
                writable: true,
            },
            MemoryBlock {
                start: 0x3000,
                end: 0x4000,
                writable: false,
            },
            MemoryBlock {
                start: 0x5000,
                end: 0x6000,
                writable: true,
            },
        ];
        assert!(covered(&blocks, 0x1ff8, 0x2005));
        assert!(!covered(&blocks, 0x2ff8, 0x3005));
        assert!(!covered(&blocks, 0x4ff8, 0x5005));
        assert!(!covered(&blocks, 0x0ff8, 0x1005));
        assert!(covered(&blocks, 0x5000, 0x500d));
    }

    #[test]
    fn test_stack_is_writable() {
        let buf = [0u8; 32];
        assert!(is_writable(buf.as_ptr() as usize, buf.len()).unwrap());
    }

    #[test]
    fn test_code_is_not_writable() {
        let f = test_code_is_not_writable as fn() as usize;
        assert!(!is_writable(f, 13).unwrap());
    }
}
