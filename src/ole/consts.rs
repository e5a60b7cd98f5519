/// Magic bytes that should be at the beginning of every OLE file
pub const MAGIC: &[u8; 8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";

/// Minimal size of an OLE file with 512-byte sectors (header, one FAT sector,
/// one directory sector)
pub const MINIMAL_OLEFILE_SIZE: usize = 1536;

/// Size of a big sector (and of the header block) in bytes
pub const SECTOR_SIZE: usize = 512;

/// Size of a mini sector in bytes
pub const MINI_SECTOR_SIZE: usize = 64;

/// Mini sectors per big sector of the mini stream
pub const MINI_PER_SECTOR: usize = SECTOR_SIZE / MINI_SECTOR_SIZE;

/// Size of a directory entry in bytes
pub const DIRENTRY_SIZE: usize = 128;

/// Directory entries per big sector
pub const DIRENTRIES_PER_SECTOR: usize = SECTOR_SIZE / DIRENTRY_SIZE;

/// Chain pointers per allocation-table sector
pub const ENTRIES_PER_SECTOR: usize = SECTOR_SIZE / 4;

/// Streams strictly smaller than this live in the mini stream
pub const MINI_STREAM_CUTOFF: u32 = 4096;

/// Number of table-sector slots available in the header
pub const MAX_HEADER_FAT_SECTORS: usize = 109;

/// Table-sector slots per extension (DIFAT) sector, the last slot links onwards
pub const EXTENSION_ENTRIES_PER_SECTOR: usize = ENTRIES_PER_SECTOR - 1;

/// Maximum entry name length in UTF-16 code units (excluding the terminator)
pub const MAX_NAME_UNITS: usize = 31;

// Sector IDs (from AAF specifications)
/// Maximum regular sector ID
pub const MAXREGSECT: u32 = 0xFFFFFFFA; // -6
/// Denotes an extension (DIFAT) sector in a FAT
pub const DIFSECT: u32 = 0xFFFFFFFC; // -4
/// Denotes a FAT sector in a FAT
pub const FATSECT: u32 = 0xFFFFFFFD; // -3
/// End of a virtual stream chain
pub const ENDOFCHAIN: u32 = 0xFFFFFFFE; // -2
/// Unallocated sector
pub const FREESECT: u32 = 0xFFFFFFFF; // -1

/// Unallocated directory entry / empty tree link
pub const NOSTREAM: u32 = 0xFFFFFFFF; // -1

/// Index of the root directory entry
pub const ROOT_ENTRY: u32 = 0;

// Object types in storage (from AAF specifications)
/// Empty directory entry
pub const STGTY_EMPTY: u8 = 0;
/// Element is a storage object
pub const STGTY_STORAGE: u8 = 1;
/// Element is a stream object
pub const STGTY_STREAM: u8 = 2;
/// Element is a root storage
pub const STGTY_ROOT: u8 = 5;

// Header field offsets
pub const HDR_MINOR_VERSION: usize = 0x18;
pub const HDR_DLL_VERSION: usize = 0x1A;
pub const HDR_BYTE_ORDER: usize = 0x1C;
pub const HDR_SECTOR_SHIFT: usize = 0x1E;
pub const HDR_MINI_SECTOR_SHIFT: usize = 0x20;
pub const HDR_NUM_FAT_SECTORS: usize = 0x2C;
pub const HDR_DIR_START: usize = 0x30;
pub const HDR_MINI_CUTOFF: usize = 0x38;
pub const HDR_MINIFAT_START: usize = 0x3C;
pub const HDR_NUM_MINIFAT_SECTORS: usize = 0x40;
pub const HDR_DIFAT_START: usize = 0x44;
pub const HDR_NUM_DIFAT_SECTORS: usize = 0x48;
pub const HDR_FAT_LIST: usize = 0x4C;

// Directory entry field offsets
pub const DE_NAME_LEN: usize = 0x40;
pub const DE_TYPE: usize = 0x42;
pub const DE_COLOR: usize = 0x43;
pub const DE_PREV: usize = 0x44;
pub const DE_NEXT: usize = 0x48;
pub const DE_DIR: usize = 0x4C;
pub const DE_START: usize = 0x74;
pub const DE_SIZE: usize = 0x78;

/// Name of the root directory entry written by `OleFile::create`
pub const ROOT_ENTRY_NAME: &str = "Root Entry";

// Property value types used by the summary information streams
pub const VT_I2: u16 = 2;
pub const VT_I4: u16 = 3;
pub const VT_BOOL: u16 = 11;
pub const VT_LPSTR: u16 = 30;
pub const VT_FILETIME: u16 = 64;
pub const VT_CF: u16 = 71;

/// Byte order mark at the start of a property set stream
pub const PROPERTY_SET_BYTE_ORDER: u16 = 0xFFFE;
