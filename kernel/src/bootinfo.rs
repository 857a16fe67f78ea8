//! What the boot stub tells the kernel: where the heap goes, the command line, and the program
//! images to start.

/// `BootInfo::magic` value written by a compatible boot stub
pub const BOOT_MAGIC: u32 = 0x5448_5244; // "THRD"

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ImageRegion {
    pub start: *const u8,
    pub len: usize,
}

#[repr(C)]
#[derive(Debug)]
pub struct BootInfo {
    pub magic: u32,
    pub heap_start: usize,
    pub heap_size: usize,
    pub cmdline: *const u8,
    pub cmdline_len: usize,
    pub images: *const ImageRegion,
    pub image_count: usize,
}

impl BootInfo {
    pub fn is_valid(&self) -> bool {
        self.magic == BOOT_MAGIC
    }

    /// The command line, or an empty string when there is none or it is not UTF-8.
    pub fn cmdline(&self) -> &str {
        if self.cmdline.is_null() || self.cmdline_len == 0 {
            return "";
        }

        // SAFETY: the boot stub guarantees the range is readable for the kernel's lifetime.
        let bytes = unsafe { core::slice::from_raw_parts(self.cmdline, self.cmdline_len) };
        core::str::from_utf8(bytes).unwrap_or("")
    }

    fn regions(&self) -> &[ImageRegion] {
        if self.images.is_null() {
            return &[];
        }

        // SAFETY: as for the command line.
        unsafe { core::slice::from_raw_parts(self.images, self.image_count) }
    }

    /// Program images handed over by the boot stub, empty regions skipped
    pub fn images(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.regions()
            .iter()
            .filter(|region| !region.start.is_null() && region.len > 0)
            // SAFETY: as for the command line.
            .map(|region| unsafe { core::slice::from_raw_parts(region.start, region.len) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boot_info(cmdline: &[u8], images: &[ImageRegion]) -> BootInfo {
        BootInfo {
            magic: BOOT_MAGIC,
            heap_start: 0,
            heap_size: 0,
            cmdline: cmdline.as_ptr(),
            cmdline_len: cmdline.len(),
            images: images.as_ptr(),
            image_count: images.len(),
        }
    }

    #[test]
    fn reads_command_line() {
        let info = boot_info(b"log=debug", &[]);
        assert!(info.is_valid());
        assert_eq!(info.cmdline(), "log=debug");
    }

    #[test]
    fn missing_or_garbled_command_line_is_empty() {
        let mut info = boot_info(&[0xFF, 0xFE], &[]);
        assert_eq!(info.cmdline(), "");

        info.cmdline = core::ptr::null();
        assert_eq!(info.cmdline(), "");
    }

    #[test]
    fn lists_non_empty_images() {
        let first = *b"first";
        let second = *b"two";
        let regions = [
            ImageRegion { start: first.as_ptr(), len: first.len() },
            ImageRegion { start: core::ptr::null(), len: 12 },
            ImageRegion { start: second.as_ptr(), len: 0 },
            ImageRegion { start: second.as_ptr(), len: second.len() },
        ];
        let info = boot_info(b"", &regions);

        let images: alloc::vec::Vec<&[u8]> = info.images().collect();
        assert_eq!(images, [&b"first"[..], &b"two"[..]]);
    }

    #[test]
    fn no_image_table() {
        let mut info = boot_info(b"", &[]);
        info.images = core::ptr::null();
        info.image_count = 3;
        assert_eq!(info.images().count(), 0);
    }
}
