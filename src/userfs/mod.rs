//! An in-memory user-space filesystem.
//!
//! A [`UserFs`] value owns a flat namespace of files, each a list of
//! fixed-size blocks, and a compact table of integer descriptors. There are
//! no directories, no persistence, and no host-OS visibility; "permissions"
//! are the per-descriptor access intent chosen at open time.
//!
//! Deleting a file unlinks its name immediately, but descriptors already
//! open on it keep working; the storage is reclaimed when the last of them
//! closes. Every operation also records its outcome in the context's
//! last-error slot, queryable via [`UserFs::last_error`].

mod file;

use std::cell::RefCell;
use std::ops::BitOr;
use std::rc::Rc;

use thiserror::Error;

use self::file::{Block, FileNode};

/// Capacity of a single storage block, in bytes.
pub const BLOCK_SIZE: usize = 4096;

/// Upper bound on the total occupied bytes of one file.
pub const MAX_FILE_SIZE: usize = 100 * 1024 * 1024;

const DESCRIPTOR_FLOOR: usize = 10;
const GROW_FACTOR: usize = 2;

/// Why a filesystem operation failed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// No such file, or the descriptor does not refer to one.
    #[error("no such file")]
    NoFile,
    /// A size limit was hit.
    #[error("out of memory")]
    NoMem,
    /// The descriptor's access mode forbids the operation.
    #[error("operation not permitted")]
    NoPermission,
}

/// Flags accepted by [`UserFs::open`].
///
/// The three access bits pick what the descriptor may do: none of them
/// means read+write, exactly one means that access only. `CREATE` is
/// orthogonal and only controls whether a missing file is created.
///
/// ```
/// use userland::OpenFlags;
///
/// let flags = OpenFlags::CREATE | OpenFlags::WRITE_ONLY;
/// assert!(flags.contains(OpenFlags::CREATE));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(u32);

impl OpenFlags {
    /// Create the file if it does not exist.
    pub const CREATE: OpenFlags = OpenFlags(0x1);
    /// The descriptor may only read.
    pub const READ_ONLY: OpenFlags = OpenFlags(0x2);
    /// The descriptor may only write.
    pub const WRITE_ONLY: OpenFlags = OpenFlags(0x4);
    /// The descriptor may read and write (the default when no access bit
    /// is given).
    pub const READ_WRITE: OpenFlags = OpenFlags(0x8);

    /// True if every bit of `other` is set in `self`.
    pub fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Access {
    fn from_flags(flags: OpenFlags) -> Access {
        let ro = flags.contains(OpenFlags::READ_ONLY);
        let wo = flags.contains(OpenFlags::WRITE_ONLY);
        let rw = flags.contains(OpenFlags::READ_WRITE);
        if ro && !wo && !rw {
            Access::ReadOnly
        } else if wo && !ro && !rw {
            Access::WriteOnly
        } else {
            Access::ReadWrite
        }
    }

    fn readable(self) -> bool {
        self != Access::WriteOnly
    }

    fn writable(self) -> bool {
        self != Access::ReadOnly
    }
}

/// An open handle on a file: shared file node, access mode, and a cursor
/// expressed as (block index, byte offset within that block).
struct Descriptor {
    file: Rc<RefCell<FileNode>>,
    access: Access,
    block: usize,
    pos: usize,
}

/// The filesystem context: file registry, descriptor table, last error.
///
/// All state lives in this value; there are no globals and no implicit
/// initialization. Single-threaded by design - all mutation happens on the
/// caller's thread.
#[derive(Default)]
pub struct UserFs {
    files: Vec<Rc<RefCell<FileNode>>>,
    descriptors: Vec<Option<Descriptor>>,
    last_error: Option<FsError>,
}

impl UserFs {
    /// Creates an empty filesystem.
    pub fn new() -> UserFs {
        UserFs {
            files: Vec::new(),
            descriptors: Vec::with_capacity(DESCRIPTOR_FLOOR),
            last_error: None,
        }
    }

    /// Error recorded by the most recent operation; `None` after a success.
    pub fn last_error(&self) -> Option<FsError> {
        self.last_error
    }

    /// Opens `name` and returns the smallest free descriptor index.
    ///
    /// Fails with [`FsError::NoFile`] if the file does not exist and
    /// `CREATE` was not given; with `CREATE`, a missing file is created
    /// with a single empty block. The cursor starts at the beginning.
    pub fn open(&mut self, name: &str, flags: OpenFlags) -> Result<usize, FsError> {
        let result = self.open_inner(name, flags);
        self.finish(result)
    }

    /// Closes a descriptor, freeing its slot for reuse.
    ///
    /// If the file was already deleted and this was its last descriptor,
    /// the storage is reclaimed.
    pub fn close(&mut self, fd: usize) -> Result<(), FsError> {
        let result = self.close_inner(fd);
        self.finish(result)
    }

    /// Reads up to `buf.len()` bytes at the descriptor's cursor, advancing
    /// it. Returns the number of bytes read; zero at end of file.
    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize, FsError> {
        let result = self.read_inner(fd, buf);
        self.finish(result)
    }

    /// Writes `buf` at the descriptor's cursor, extending the file with new
    /// blocks as needed, and advances the cursor.
    ///
    /// Fails with [`FsError::NoMem`] without writing anything if the write
    /// could not complete within [`MAX_FILE_SIZE`].
    pub fn write(&mut self, fd: usize, buf: &[u8]) -> Result<usize, FsError> {
        let result = self.write_inner(fd, buf);
        self.finish(result)
    }

    /// Unlinks `name`.
    ///
    /// If no descriptor is open on the file it is destroyed immediately;
    /// otherwise it becomes invisible to [`open`] but remains usable
    /// through the descriptors already holding it.
    ///
    /// [`open`]: UserFs::open
    pub fn delete(&mut self, name: &str) -> Result<(), FsError> {
        let result = self.delete_inner(name);
        self.finish(result)
    }

    /// Sets the file's size to exactly `new_size` bytes.
    ///
    /// Shrinking frees tail blocks and pulls back every descriptor of this
    /// file whose cursor lies past the new tail. Growing appends blocks;
    /// the new bytes are unspecified (currently zero).
    pub fn resize(&mut self, fd: usize, new_size: usize) -> Result<(), FsError> {
        let result = self.resize_inner(fd, new_size);
        self.finish(result)
    }

    /// Drops every descriptor and every file.
    pub fn destroy(&mut self) {
        self.descriptors.clear();
        self.files.clear();
        self.last_error = None;
    }

    fn finish<T>(&mut self, result: Result<T, FsError>) -> Result<T, FsError> {
        self.last_error = result.as_ref().err().copied();
        result
    }

    fn find(&self, name: &str) -> Option<Rc<RefCell<FileNode>>> {
        self.files
            .iter()
            .find(|file| {
                let file = file.borrow();
                !file.removed && file.name == name
            })
            .map(Rc::clone)
    }

    fn open_inner(&mut self, name: &str, flags: OpenFlags) -> Result<usize, FsError> {
        let file = match self.find(name) {
            Some(file) => file,
            None => {
                if !flags.contains(OpenFlags::CREATE) {
                    return Err(FsError::NoFile);
                }
                let file = Rc::new(RefCell::new(FileNode::new(name)));
                self.files.push(Rc::clone(&file));
                file
            }
        };

        let descriptor = Descriptor {
            file,
            access: Access::from_flags(flags),
            block: 0,
            pos: 0,
        };

        let fd = match self.descriptors.iter().position(Option::is_none) {
            Some(free) => {
                self.descriptors[free] = Some(descriptor);
                free
            }
            None => {
                if self.descriptors.len() == self.descriptors.capacity() {
                    self.descriptors.reserve_exact(self.descriptors.capacity());
                }
                self.descriptors.push(Some(descriptor));
                self.descriptors.len() - 1
            }
        };
        Ok(fd)
    }

    fn close_inner(&mut self, fd: usize) -> Result<(), FsError> {
        let slot = self.descriptors.get_mut(fd).ok_or(FsError::NoFile)?;
        // dropping the descriptor releases the last reference to a
        // tombstoned file, which frees its blocks
        slot.take().ok_or(FsError::NoFile)?;

        while matches!(self.descriptors.last(), Some(None)) {
            self.descriptors.pop();
        }
        self.shrink_table_if_sparse();
        Ok(())
    }

    fn shrink_table_if_sparse(&mut self) {
        let cap = self.descriptors.capacity();
        if self.descriptors.len() * GROW_FACTOR < cap && cap > DESCRIPTOR_FLOOR {
            self.descriptors
                .shrink_to((cap / GROW_FACTOR).max(DESCRIPTOR_FLOOR));
        }
    }

    fn read_inner(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize, FsError> {
        let descriptor = self
            .descriptors
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(FsError::NoFile)?;
        if !descriptor.access.readable() {
            return Err(FsError::NoPermission);
        }

        let file = descriptor.file.borrow();
        let mut total = 0;
        while total < buf.len() {
            if descriptor.pos == BLOCK_SIZE {
                if descriptor.block + 1 >= file.blocks.len() {
                    break;
                }
                descriptor.block += 1;
                descriptor.pos = 0;
            }
            let block = &file.blocks[descriptor.block];
            let available = block.occupied.saturating_sub(descriptor.pos);
            let count = available.min(buf.len() - total);
            if count == 0 {
                break;
            }
            buf[total..total + count]
                .copy_from_slice(&block.data[descriptor.pos..descriptor.pos + count]);
            descriptor.pos += count;
            total += count;
        }
        Ok(total)
    }

    fn write_inner(&mut self, fd: usize, buf: &[u8]) -> Result<usize, FsError> {
        let descriptor = self
            .descriptors
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(FsError::NoFile)?;
        if !descriptor.access.writable() {
            return Err(FsError::NoPermission);
        }

        // where the cursor would land if the whole buffer went through
        let end = descriptor.block * BLOCK_SIZE + descriptor.pos + buf.len();
        if end > MAX_FILE_SIZE {
            return Err(FsError::NoMem);
        }

        let mut file = descriptor.file.borrow_mut();
        let mut total = 0;
        while total < buf.len() {
            if descriptor.pos == BLOCK_SIZE {
                if descriptor.block + 1 >= file.blocks.len() {
                    file.blocks.push(Block::new());
                }
                descriptor.block += 1;
                descriptor.pos = 0;
            }
            let block = &mut file.blocks[descriptor.block];
            let count = (BLOCK_SIZE - descriptor.pos).min(buf.len() - total);
            block.data[descriptor.pos..descriptor.pos + count]
                .copy_from_slice(&buf[total..total + count]);
            descriptor.pos += count;
            total += count;
            if descriptor.pos > block.occupied {
                block.occupied = descriptor.pos;
            }
        }
        Ok(total)
    }

    fn delete_inner(&mut self, name: &str) -> Result<(), FsError> {
        let index = self
            .files
            .iter()
            .position(|file| file.borrow().name == name)
            .ok_or(FsError::NoFile)?;
        let file = self.files.remove(index);
        if Rc::strong_count(&file) > 1 {
            // descriptors still hold it; storage goes away with the last
            // close
            file.borrow_mut().removed = true;
        }
        Ok(())
    }

    fn resize_inner(&mut self, fd: usize, new_size: usize) -> Result<(), FsError> {
        let descriptor = self
            .descriptors
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(FsError::NoFile)?;
        if !descriptor.access.writable() {
            return Err(FsError::NoPermission);
        }
        if new_size > MAX_FILE_SIZE {
            return Err(FsError::NoMem);
        }

        let file = Rc::clone(&descriptor.file);
        let target = new_size.div_ceil(BLOCK_SIZE).max(1);
        let shrunk = {
            let mut file = file.borrow_mut();
            if new_size < file.size() {
                file.blocks.truncate(target);
                file.blocks[target - 1].occupied = new_size - (target - 1) * BLOCK_SIZE;
                true
            } else {
                // interior blocks are full by invariant; top up the tail,
                // append full blocks, then trim the new tail's count
                file.blocks.last_mut().unwrap().occupied = BLOCK_SIZE;
                while file.blocks.len() < target {
                    let mut block = Block::new();
                    block.occupied = BLOCK_SIZE;
                    file.blocks.push(block);
                }
                file.blocks.last_mut().unwrap().occupied = new_size - (target - 1) * BLOCK_SIZE;
                false
            }
        };

        if shrunk {
            let tail_occupied = file.borrow().blocks[target - 1].occupied;
            for slot in self.descriptors.iter_mut().flatten() {
                if !Rc::ptr_eq(&slot.file, &file) {
                    continue;
                }
                if slot.block > target - 1 {
                    slot.block = target - 1;
                    slot.pos = tail_occupied;
                } else if slot.block == target - 1 && slot.pos > tail_occupied {
                    slot.pos = tail_occupied;
                }
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn table_len(&self) -> usize {
        self.descriptors.len()
    }

    #[cfg(test)]
    pub(crate) fn table_capacity(&self) -> usize {
        self.descriptors.capacity()
    }

    #[cfg(test)]
    pub(crate) fn live_file_count(&self) -> usize {
        self.files.len()
    }

    #[cfg(test)]
    pub(crate) fn file_size(&self, fd: usize) -> Option<usize> {
        let descriptor = self.descriptors.get(fd)?.as_ref()?;
        Some(descriptor.file.borrow().size())
    }
}
