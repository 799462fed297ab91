//! Process arguments block (spec.md §6: "A struct written at the base of
//! the new process address space by spawn, containing: struct version =
//! `sizeof(process_arguments)`, total size, argc, argv table pointer,
//! envp table pointer, image base. argv/envp tables end in a NULL
//! entry.").
//!
//! Grounded on spec.md's own field list; there is no donor equivalent
//! (the donor kernel passes argv/envp through a different ABI), so the
//! layout here follows spec.md literally rather than any donor source.

use alloc::string::String;
use alloc::vec::Vec;

/// The fixed-size header spec.md places at the base of a new process's
/// address space.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ProcessArguments {
    /// Always `size_of::<ProcessArguments>()`; lets a future larger
    /// layout be detected by an older reader.
    pub version: u32,
    /// Total size of this block plus the argv/envp tables and string
    /// data that follow it in the image.
    pub total_size: u32,
    /// Number of `argv` entries (excluding the trailing NULL).
    pub argc: u32,
    /// Address, within the process's address space, of the argv table.
    pub argv: usize,
    /// Address, within the process's address space, of the envp table.
    pub envp: usize,
    /// Base address of the loaded image.
    pub image_base: usize,
}

impl ProcessArguments {
    /// Builds the header for `argc` arguments, given where the argv/envp
    /// tables and image were placed.
    #[must_use]
    pub fn new(argc: u32, argv: usize, envp: usize, image_base: usize, total_size: u32) -> Self {
        Self {
            version: core::mem::size_of::<Self>() as u32,
            total_size,
            argc,
            argv,
            envp,
            image_base,
        }
    }
}

/// Lays out `argv`/`envp` C-string tables (NULL-terminated pointer
/// arrays over NUL-terminated byte strings) into a flat byte buffer
/// suitable for copying into a freshly allocated address-space block.
///
/// Returns the buffer plus the byte offsets, within it, of the argv
/// table and the envp table (each relative to `base`, so the caller can
/// add the block's real address once allocated).
#[must_use]
pub fn build_argument_image(argv: &[String], envp: &[String], base: usize) -> (Vec<u8>, usize, usize) {
    let ptr_size = core::mem::size_of::<usize>();

    let mut strings = Vec::new();
    let mut argv_offsets = Vec::with_capacity(argv.len());
    for s in argv {
        argv_offsets.push(strings.len());
        strings.extend_from_slice(s.as_bytes());
        strings.push(0);
    }
    let mut envp_offsets = Vec::with_capacity(envp.len());
    for s in envp {
        envp_offsets.push(strings.len());
        strings.extend_from_slice(s.as_bytes());
        strings.push(0);
    }

    let argv_table_len = (argv.len() + 1) * ptr_size;
    let envp_table_len = (envp.len() + 1) * ptr_size;

    let argv_table_offset = 0;
    let envp_table_offset = argv_table_len;
    let strings_offset = argv_table_len + envp_table_len;

    let mut image = alloc::vec![0u8; strings_offset + strings.len()];
    for (i, off) in argv_offsets.iter().enumerate() {
        let ptr = base + strings_offset + off;
        let at = argv_table_offset + i * ptr_size;
        image[at..at + ptr_size].copy_from_slice(&ptr.to_ne_bytes());
    }
    for (i, off) in envp_offsets.iter().enumerate() {
        let ptr = base + strings_offset + off;
        let at = envp_table_offset + i * ptr_size;
        image[at..at + ptr_size].copy_from_slice(&ptr.to_ne_bytes());
    }
    image[strings_offset..].copy_from_slice(&strings);

    (image, base + argv_table_offset, base + envp_table_offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn header_version_is_its_own_size() {
        let header = ProcessArguments::new(0, 0, 0, 0, 0);
        assert_eq!(header.version as usize, core::mem::size_of::<ProcessArguments>());
    }

    #[test]
    fn argument_image_places_tables_before_strings() {
        let argv = alloc::vec!["sh".to_string(), "-c".to_string()];
        let envp = alloc::vec!["HOME=/".to_string()];
        let (image, argv_addr, envp_addr) = build_argument_image(&argv, &envp, 0x1000);

        let ptr_size = core::mem::size_of::<usize>();
        assert_eq!(argv_addr, 0x1000);
        assert_eq!(envp_addr, 0x1000 + (argv.len() + 1) * ptr_size);
        assert!(!image.is_empty());

        // The last argv slot is the NULL terminator.
        let last_argv_ptr_offset = argv.len() * ptr_size;
        let slot = &image[last_argv_ptr_offset..last_argv_ptr_offset + ptr_size];
        assert!(slot.iter().all(|&b| b == 0));
    }
}
