use std::io::{Read, Write};
use std::path::Path;

use tracing::debug;

use super::buffer::{BufferView, ContainerBuffer};
use super::config::OleOptions;
use super::consts::*;
use super::directory::{DirCursor, DirEntry, Directory, EntryType, Stat};
use super::error::{OleError, OleResult, tolerate};
use super::header;
use super::minifat::MiniAllocator;
use super::sector::SectorTable;
use super::stream::{Stream, StreamMode};

/// An open OLE2 compound file
///
/// The whole file is held in memory. Allocation tables and the directory are
/// decoded on open and written back by [`flush`](Self::flush); stream data is
/// read and written in place.
///
/// # Examples
///
/// ```rust
/// use msole::ole::{OleFile, OleOptions, StreamMode};
///
/// let mut ole = OleFile::create(OleOptions::default())?;
/// let mut stream = ole.open_stream_path(&["Workbook"], StreamMode::Write)?;
/// stream.write(&mut ole, &[0x09, 0x08, 0x00, 0x00])?;
/// stream.close(&mut ole)?;
///
/// let bytes = ole.to_bytes()?;
/// let mut reopened = OleFile::from_bytes(bytes, OleOptions::default())?;
/// assert_eq!(reopened.read_stream(&["workbook"])?, vec![0x09, 0x08, 0x00, 0x00]);
/// # Ok::<(), msole::ole::OleError>(())
/// ```
#[derive(Debug)]
pub struct OleFile {
    pub(crate) buffer: ContainerBuffer,
    pub(crate) fat: SectorTable,
    pub(crate) mini: MiniAllocator,
    pub(crate) directory: Directory,
    pub(crate) options: OleOptions,
    /// In-memory tables differ from the buffer
    pub(crate) dirty: bool,
}

impl OleFile {
    /// Open a compound file from disk
    pub fn open<P: AsRef<Path>>(path: P, options: OleOptions) -> OleResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        debug!(path = %path.as_ref().display(), bytes = bytes.len(), "opening compound file");
        Self::from_bytes(bytes, options)
    }

    /// Read a whole compound file from `reader`
    pub fn from_reader<R: Read>(mut reader: R, options: OleOptions) -> OleResult<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(bytes, options)
    }

    /// Parse a compound file image
    pub fn from_bytes(mut bytes: Vec<u8>, options: OleOptions) -> OleResult<Self> {
        if bytes.len() < SECTOR_SIZE || &bytes[0..8] != MAGIC {
            return Err(OleError::NotOleFile);
        }
        header::validate(&bytes[..SECTOR_SIZE], options.lenient)?;

        let partial = bytes.len() % SECTOR_SIZE;
        if partial != 0 {
            tolerate(
                options.lenient,
                format!(
                    "file length {} is not a multiple of {}, padding the last sector",
                    bytes.len(),
                    SECTOR_SIZE
                ),
            )?;
            bytes.resize(bytes.len() + SECTOR_SIZE - partial, 0);
        }

        let mut buffer = ContainerBuffer::new(bytes);
        let fat = SectorTable::load(&mut buffer, options.lenient)?;
        let directory = Directory::load(&buffer, &fat, options.lenient)?;
        let mini = MiniAllocator::load(&buffer, &fat, directory.root()?.start, options.lenient)?;

        debug!(
            sectors = buffer.sector_count(),
            table_sectors = fat.table_sectors().len(),
            entries = directory.len(),
            "loaded compound file"
        );
        Ok(Self {
            buffer,
            fat,
            mini,
            directory,
            options,
            dirty: false,
        })
    }

    /// New container with the minimal layout: header, one allocation-table
    /// sector and one directory sector holding the root entry
    pub fn create(options: OleOptions) -> OleResult<Self> {
        let mut buffer = ContainerBuffer::new(vec![0u8; MINIMAL_OLEFILE_SIZE]);
        header::initialize(buffer.header_mut())?;

        let mut ole = Self {
            buffer,
            fat: SectorTable::with_directory_sector(),
            mini: MiniAllocator::default(),
            directory: Directory::with_root(1, options.lenient),
            options,
            dirty: true,
        };
        ole.store()?;
        Ok(ole)
    }

    pub fn options(&self) -> &OleOptions {
        &self.options
    }

    /// Growth counter of the backing buffer
    pub fn generation(&self) -> u64 {
        self.buffer.generation()
    }

    /// Size of the container image in bytes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.len() == 0
    }

    /// Bytes behind a view from [`Stream::read_view`]
    pub fn resolve(&self, view: &BufferView) -> OleResult<&[u8]> {
        self.buffer.resolve(view)
    }

    fn ensure_writable(&self, what: &str) -> OleResult<()> {
        if self.options.read_only {
            return Err(OleError::PermissionDenied(format!(
                "container is read-only, cannot {}",
                what
            )));
        }
        Ok(())
    }

    /// Write the allocation tables, directory and header into the buffer
    pub fn flush(&mut self) -> OleResult<()> {
        if self.options.read_only || !self.dirty {
            return Ok(());
        }
        self.store()
    }

    fn store(&mut self) -> OleResult<()> {
        let root = self.directory.get_mut(ROOT_ENTRY)?;
        root.start = self.mini.stream_start();
        root.size = self.mini.stream_size();

        self.directory.store(&mut self.buffer)?;
        self.mini.store(&mut self.buffer)?;
        self.fat.store(&mut self.buffer)?;
        self.dirty = false;
        debug!(bytes = self.buffer.len(), "flushed compound file");
        Ok(())
    }

    /// Flush and copy out the container image
    pub fn to_bytes(&mut self) -> OleResult<Vec<u8>> {
        self.flush()?;
        Ok(self.buffer.as_slice().to_vec())
    }

    /// Flush and hand over the container image
    pub fn into_bytes(mut self) -> OleResult<Vec<u8>> {
        self.flush()?;
        Ok(self.buffer.into_inner())
    }

    pub fn write_to<W: Write>(&mut self, mut writer: W) -> OleResult<()> {
        self.flush()?;
        writer.write_all(self.buffer.as_slice())?;
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> OleResult<()> {
        self.flush()?;
        std::fs::write(path.as_ref(), self.buffer.as_slice())?;
        Ok(())
    }

    /// Cursor over the children of the root entry
    pub fn root_cursor(&self) -> OleResult<DirCursor> {
        self.directory.root_cursor()
    }

    /// Re-anchor `cursor` on the children of `storage`
    pub fn enter(&self, cursor: &mut DirCursor, storage: u32) -> OleResult<()> {
        self.directory.enter(cursor, storage)
    }

    /// Next entry of the cursor's level, `None` at the end
    pub fn next_entry(&self, cursor: &mut DirCursor) -> OleResult<Option<&DirEntry>> {
        self.directory
            .next(cursor)?
            .map(|index| self.directory.get(index))
            .transpose()
    }

    pub fn entry(&self, index: u32) -> OleResult<&DirEntry> {
        self.directory.get(index)
    }

    /// Resolve a path, matching names case-insensitively
    pub fn lookup(&self, path: &[&str]) -> OleResult<u32> {
        self.directory.lookup(path)
    }

    pub fn exists(&self, path: &[&str]) -> bool {
        self.directory.lookup(path).is_ok()
    }

    pub fn stat(&self, path: &[&str]) -> OleResult<Stat> {
        self.directory.stat(self.directory.lookup(path)?)
    }

    pub fn stat_entry(&self, index: u32) -> OleResult<Stat> {
        self.directory.stat(index)
    }

    /// Names of the entries in a storage
    pub fn list(&self, path: &[&str]) -> OleResult<Vec<String>> {
        self.directory.list(self.directory.lookup(path)?)
    }

    /// Paths of all streams
    pub fn list_streams(&self) -> OleResult<Vec<Vec<String>>> {
        self.directory.list_streams()
    }

    /// Add an empty storage or stream under `parent`
    pub fn create_entry(&mut self, parent: u32, name: &str, entry_type: EntryType) -> OleResult<u32> {
        self.ensure_writable("create entries")?;
        let growth = self.options.growth_step();
        let index = self.directory.create(
            parent,
            name,
            entry_type,
            &mut self.fat,
            &mut self.buffer,
            growth,
        )?;
        self.dirty = true;
        Ok(index)
    }

    /// Remove a leaf entry, releasing its sectors
    pub fn unlink(&mut self, index: u32) -> OleResult<()> {
        self.ensure_writable("remove entries")?;
        self.directory
            .unlink(index, &mut self.fat, &mut self.mini)?;
        self.dirty = true;
        Ok(())
    }

    /// Open the stream at directory index `index`
    pub fn open_stream(&mut self, index: u32, mode: StreamMode) -> OleResult<Stream> {
        Stream::open(self, index, mode)
    }

    /// Open a stream by path.
    ///
    /// In write mode missing storages along the path and the stream itself are
    /// created.
    pub fn open_stream_path(&mut self, path: &[&str], mode: StreamMode) -> OleResult<Stream> {
        if mode == StreamMode::Read {
            let index = self.directory.lookup(path)?;
            return Stream::open(self, index, mode);
        }

        let Some((name, parents)) = path.split_last() else {
            return Err(OleError::InvalidName("empty stream path".to_string()));
        };
        self.ensure_writable("open streams for writing")?;

        let mut parent = ROOT_ENTRY;
        for storage in parents {
            parent = match self.directory.find_child(parent, storage)? {
                Some(index) => index,
                None => self.create_entry(parent, storage, EntryType::Storage)?,
            };
        }
        let index = match self.directory.find_child(parent, name)? {
            Some(index) => index,
            None => self.create_entry(parent, name, EntryType::Stream)?,
        };
        Stream::open(self, index, mode)
    }

    /// Read a whole stream by path
    pub fn read_stream(&mut self, path: &[&str]) -> OleResult<Vec<u8>> {
        let mut stream = self.open_stream_path(path, StreamMode::Read)?;
        stream.read_to_end(self)
    }

    /// Root entry name as stored in the file
    pub fn root_name(&self) -> OleResult<&str> {
        Ok(self.directory.root()?.name.as_str())
    }
}

/// Check if data is an OLE2 file by examining the header signature
pub fn is_ole_file(data: &[u8]) -> bool {
    data.len() >= MINIMAL_OLEFILE_SIZE && &data[0..8] == MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_minimal_layout() {
        let mut ole = OleFile::create(OleOptions::default()).unwrap();
        let bytes = ole.to_bytes().unwrap();
        assert_eq!(bytes.len(), MINIMAL_OLEFILE_SIZE);
        assert!(is_ole_file(&bytes));

        let reopened = OleFile::from_bytes(bytes, OleOptions::new().with_lenient(false)).unwrap();
        assert_eq!(reopened.root_name().unwrap(), ROOT_ENTRY_NAME);
        assert!(reopened.list(&[]).unwrap().is_empty());
        assert_eq!(reopened.generation(), 0);
    }

    #[test]
    fn test_not_ole() {
        assert!(matches!(
            OleFile::from_bytes(vec![0u8; 2048], OleOptions::default()),
            Err(OleError::NotOleFile)
        ));
        assert!(!is_ole_file(b"PK\x03\x04"));
    }

    #[test]
    fn test_partial_trailing_sector() {
        let mut ole = OleFile::create(OleOptions::default()).unwrap();
        let mut bytes = ole.to_bytes().unwrap();
        bytes.extend_from_slice(&[0u8; 100]);

        assert!(OleFile::from_bytes(bytes.clone(), OleOptions::new().with_lenient(false)).is_err());
        // The padded sector shows up as a free sector
        let lenient = OleFile::from_bytes(bytes, OleOptions::default()).unwrap();
        assert_eq!(lenient.len(), MINIMAL_OLEFILE_SIZE + SECTOR_SIZE);
    }

    #[test]
    fn test_read_only_container() {
        let mut ole = OleFile::create(OleOptions::default()).unwrap();
        let bytes = ole.to_bytes().unwrap();
        let mut ro = OleFile::from_bytes(bytes, OleOptions::new().with_read_only(true)).unwrap();
        assert!(matches!(
            ro.open_stream_path(&["x"], StreamMode::Write),
            Err(OleError::PermissionDenied(_))
        ));
        assert!(ro.create_entry(ROOT_ENTRY, "x", EntryType::Stream).is_err());
    }

    #[test]
    fn test_open_stream_path_creates_storages() {
        let mut ole = OleFile::create(OleOptions::default()).unwrap();
        let mut stream = ole
            .open_stream_path(&["ObjectPool", "_1", "Ole"], StreamMode::Write)
            .unwrap();
        stream.write(&mut ole, b"payload").unwrap();
        stream.close(&mut ole).unwrap();

        assert_eq!(ole.stat(&["objectpool"]).unwrap().entry_type, EntryType::Storage);
        assert_eq!(
            ole.stat(&["ObjectPool", "_1", "Ole"]).unwrap(),
            Stat {
                entry_type: EntryType::Stream,
                size: 7
            }
        );
        assert_eq!(ole.read_stream(&["ObjectPool", "_1", "Ole"]).unwrap(), b"payload");
        assert!(ole.exists(&["ObjectPool", "_1"]));
        assert!(!ole.exists(&["ObjectPool", "_2"]));
    }

    #[test]
    fn test_enumerate_through_container() {
        let mut ole = OleFile::create(OleOptions::default()).unwrap();
        for name in ["Workbook", "SummaryInformation"] {
            ole.create_entry(ROOT_ENTRY, name, EntryType::Stream).unwrap();
        }
        let mut cursor = ole.root_cursor().unwrap();
        let mut names = Vec::new();
        while let Some(entry) = ole.next_entry(&mut cursor).unwrap() {
            names.push(entry.name.clone());
        }
        assert_eq!(names, vec!["Workbook", "SummaryInformation"]);
    }
}
