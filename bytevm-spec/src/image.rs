//! Executable image and load table.
//!
//! The image the machine flashes is a flat byte sequence; execution starts
//! at offset 0 unless the loader seeds IP. The load table is a build-side
//! artifact describing where the assembler placed each chunk of output, so
//! external tooling can reason about the layout. The VM itself never
//! consults it at runtime.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One entry of the load table: a run of image bytes and the address it
/// occupies once flashed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Offset of the run within the image file.
    pub file_offset: u32,
    /// Length of the run in bytes.
    pub size: u32,
    /// Address of the run in machine memory after a flat load at 0.
    pub target_address: u64,
}

impl Segment {
    /// First address past the segment.
    pub fn end(&self) -> u64 {
        self.target_address + self.size as u64
    }

    /// Check whether two segments occupy overlapping address ranges.
    pub fn overlaps(&self, other: &Segment) -> bool {
        self.size != 0
            && other.size != 0
            && self.target_address < other.end()
            && other.target_address < self.end()
    }
}

/// A built executable: flat bytes plus the load table that produced them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub bytes: Vec<u8>,
    pub load_table: Vec<Segment>,
}

impl Image {
    /// Wrap raw bytes as a single-segment image loaded at address 0.
    pub fn new(bytes: Vec<u8>) -> Self {
        let table = vec![Segment {
            file_offset: 0,
            size: bytes.len() as u32,
            target_address: 0,
        }];
        Image { bytes, load_table: table }
    }

    /// Build an image from explicit segments.
    pub fn with_load_table(bytes: Vec<u8>, load_table: Vec<Segment>) -> Self {
        Image { bytes, load_table }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// First pair of overlapping load-table segments, if any. Overlap is a
    /// build diagnostic, not an error; the flat image is authoritative.
    pub fn overlapping_segments(&self) -> Option<(Segment, Segment)> {
        for (i, a) in self.load_table.iter().enumerate() {
            for b in &self.load_table[i + 1..] {
                if a.overlaps(b) {
                    return Some((*a, *b));
                }
            }
        }
        None
    }

    /// SHA-256 digest over the image bytes and load table.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        for seg in &self.load_table {
            hasher.update(seg.file_offset.to_le_bytes());
            hasher.update(seg.size.to_le_bytes());
            hasher.update(seg.target_address.to_le_bytes());
        }
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_segment_image() {
        let image = Image::new(vec![0x00, 0x36]);
        assert_eq!(image.len(), 2);
        assert_eq!(image.load_table.len(), 1);
        assert_eq!(image.load_table[0].size, 2);
        assert_eq!(image.load_table[0].target_address, 0);
        assert!(image.overlapping_segments().is_none());
    }

    #[test]
    fn test_segment_overlap() {
        let a = Segment { file_offset: 0, size: 16, target_address: 0 };
        let b = Segment { file_offset: 16, size: 8, target_address: 8 };
        let c = Segment { file_offset: 24, size: 8, target_address: 16 };

        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));

        let empty = Segment { file_offset: 0, size: 0, target_address: 4 };
        assert!(!a.overlaps(&empty));
    }

    #[test]
    fn test_overlap_detection_in_table() {
        let bytes = vec![0u8; 32];
        let image = Image::with_load_table(
            bytes,
            vec![
                Segment { file_offset: 0, size: 16, target_address: 0 },
                Segment { file_offset: 16, size: 16, target_address: 12 },
            ],
        );
        let (a, b) = image.overlapping_segments().unwrap();
        assert_eq!(a.target_address, 0);
        assert_eq!(b.target_address, 12);
    }

    #[test]
    fn test_digest_changes_with_contents() {
        let a = Image::new(vec![1, 2, 3]);
        let b = Image::new(vec![1, 2, 4]);
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest(), Image::new(vec![1, 2, 3]).digest());
    }
}
