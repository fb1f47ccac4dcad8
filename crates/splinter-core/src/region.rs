//! Backing-object lifecycle: create, open, map, unlink.
//!
//! A store is backed either by a POSIX shared-memory object (gone on
//! reboot) or by a regular file (persists until unlinked). Creation is
//! exclusive (`O_EXCL` / `create_new`), truncates the object to the exact
//! layout size, maps it read-write and shared, and writes the initial
//! header and slot table. Opening maps the existing object and verifies
//! magic, version, and that the mapping is large enough for the geometry
//! its own header declares.
//!
//! Closing is dropping: the mapping is unmapped and the backing object
//! persists until explicitly unlinked.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;

use memmap2::MmapMut;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;

use splinter_error::{Result, SplinterError};
use splinter_types::{LAYOUT_VERSION, SPLINTER_MAGIC};

use crate::layout::{self, HEADER_SIZE, Header};

// ---------------------------------------------------------------------------
// Backing
// ---------------------------------------------------------------------------

/// Where a store's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backing {
    /// POSIX shared-memory object, `"/name"` semantics.
    Shm(String),
    /// Regular file at a filesystem path.
    File(PathBuf),
}

impl Backing {
    /// Interpret a name string: a leading `/` with no further separator is
    /// a POSIX shm object name; anything else is a filesystem path.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        if let Some(rest) = name.strip_prefix('/') {
            if !rest.is_empty() && !rest.contains('/') {
                return Self::Shm(name.to_owned());
            }
        }
        Self::File(PathBuf::from(name))
    }

    /// The name as a path, for error reporting.
    #[must_use]
    pub fn display_path(&self) -> PathBuf {
        match self {
            Self::Shm(name) => PathBuf::from(name),
            Self::File(path) => path.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Region
// ---------------------------------------------------------------------------

/// An open, mapped store region. Dropping unmaps.
#[derive(Debug)]
pub struct Region {
    /// Keeps the mapping alive; all access goes through `base`.
    map: MmapMut,
    base: *mut u8,
    backing: Backing,
}

impl Region {
    /// Create the backing object exclusively and initialize a fresh region.
    pub fn create(backing: &Backing, slots: u32, max_val_sz: u32) -> Result<Self> {
        if !layout::geometry_is_valid(slots, max_val_sz) {
            return Err(SplinterError::BadGeometry {
                slots: u64::from(slots),
                max_val_sz: u64::from(max_val_sz),
            });
        }
        let total = layout::total_bytes(slots, max_val_sz);
        let file = create_backing(backing)?;
        file.set_len(total as u64)?;

        // SAFETY: the fd was opened read-write; the mapping outlives every
        // pointer derived from it because `map` lives inside the region.
        let mut map = unsafe { MmapMut::map_mut(&file)? };
        let base = map.as_mut_ptr();
        // SAFETY: freshly truncated mappings are kernel-zeroed, 64-byte
        // aligned (page aligned), at least `total` bytes, and unshared
        // until we return.
        unsafe { layout::initialize_region(base, slots, max_val_sz) };

        tracing::debug!(
            target: "splinter.region",
            backing = ?backing,
            slots,
            max_val_sz,
            total,
            "created region"
        );
        Ok(Self {
            map,
            base,
            backing: backing.clone(),
        })
    }

    /// Map an existing region and validate its header.
    pub fn open(backing: &Backing) -> Result<Self> {
        let file = open_backing(backing)?;
        let actual = file.metadata()?.len();
        let actual = usize::try_from(actual).unwrap_or(usize::MAX);
        if actual < HEADER_SIZE {
            return Err(SplinterError::TruncatedRegion {
                expected: HEADER_SIZE,
                actual,
            });
        }

        // SAFETY: read-write fd; mapping owned by the returned region.
        let mut map = unsafe { MmapMut::map_mut(&file)? };
        let base = map.as_mut_ptr();

        // SAFETY: the mapping is at least HEADER_SIZE bytes and page
        // aligned, so a Header view is in bounds and well aligned.
        let header = unsafe { &*base.cast::<Header>() };
        if header.magic != SPLINTER_MAGIC {
            return Err(SplinterError::BadMagic {
                found: header.magic,
            });
        }
        if header.version != LAYOUT_VERSION {
            return Err(SplinterError::BadVersion {
                found: header.version,
                expected: LAYOUT_VERSION,
            });
        }
        if !layout::geometry_is_valid(header.slots, header.max_val_sz) {
            return Err(SplinterError::BadGeometry {
                slots: u64::from(header.slots),
                max_val_sz: u64::from(header.max_val_sz),
            });
        }
        let expected = layout::total_bytes(header.slots, header.max_val_sz);
        if actual < expected {
            return Err(SplinterError::TruncatedRegion { expected, actual });
        }

        tracing::debug!(
            target: "splinter.region",
            backing = ?backing,
            slots = header.slots,
            max_val_sz = header.max_val_sz,
            "opened region"
        );
        Ok(Self {
            map,
            base,
            backing: backing.clone(),
        })
    }

    /// Open if present, otherwise create with the supplied geometry.
    pub fn open_or_create(backing: &Backing, slots: u32, max_val_sz: u32) -> Result<Self> {
        match Self::open(backing) {
            Err(SplinterError::StoreNotFound { .. }) => Self::create(backing, slots, max_val_sz),
            other => other,
        }
    }

    /// Create, or open if the object already exists.
    pub fn create_or_open(backing: &Backing, slots: u32, max_val_sz: u32) -> Result<Self> {
        match Self::create(backing, slots, max_val_sz) {
            Err(SplinterError::StoreExists { .. }) => Self::open(backing),
            other => other,
        }
    }

    /// Remove the backing object. Existing mappings stay valid until their
    /// owners drop them; new opens will fail with not-found.
    pub fn unlink(backing: &Backing) -> Result<()> {
        match backing {
            Backing::Shm(name) => {
                nix::sys::mman::shm_unlink(name.as_str()).map_err(|errno| match errno {
                    nix::errno::Errno::ENOENT => SplinterError::StoreNotFound {
                        path: backing.display_path(),
                    },
                    other => SplinterError::Io(io::Error::from_raw_os_error(other as i32)),
                })
            }
            Backing::File(path) => std::fs::remove_file(path).map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    SplinterError::StoreNotFound {
                        path: path.clone(),
                    }
                } else {
                    SplinterError::Io(e)
                }
            }),
        }
    }

    /// Base address of the mapping.
    #[inline]
    pub(crate) fn base(&self) -> *mut u8 {
        self.base
    }

    /// Mapped length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the mapping is empty (never true for a valid region).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The backing object this region was opened from.
    #[must_use]
    pub fn backing(&self) -> &Backing {
        &self.backing
    }
}

// ---------------------------------------------------------------------------
// Backing-object open/create helpers
// ---------------------------------------------------------------------------

fn create_backing(backing: &Backing) -> Result<File> {
    match backing {
        Backing::Shm(name) => {
            let fd = nix::sys::mman::shm_open(
                name.as_str(),
                OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_EXCL,
                Mode::from_bits_truncate(0o600),
            )
            .map_err(|errno| match errno {
                nix::errno::Errno::EEXIST => SplinterError::StoreExists {
                    path: backing.display_path(),
                },
                other => SplinterError::Io(io::Error::from_raw_os_error(other as i32)),
            })?;
            Ok(File::from(fd))
        }
        Backing::File(path) => OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    SplinterError::StoreExists { path: path.clone() }
                } else {
                    SplinterError::Io(e)
                }
            }),
    }
}

fn open_backing(backing: &Backing) -> Result<File> {
    match backing {
        Backing::Shm(name) => {
            let fd = nix::sys::mman::shm_open(name.as_str(), OFlag::O_RDWR, Mode::empty())
                .map_err(|errno| match errno {
                    nix::errno::Errno::ENOENT => SplinterError::StoreNotFound {
                        path: backing.display_path(),
                    },
                    other => SplinterError::Io(io::Error::from_raw_os_error(other as i32)),
                })?;
            Ok(File::from(fd))
        }
        Backing::File(path) => OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    SplinterError::StoreNotFound {
                        path: path.clone(),
                    }
                } else {
                    SplinterError::Io(e)
                }
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backing_parse_rules() {
        assert_eq!(
            Backing::parse("/bus"),
            Backing::Shm("/bus".to_owned())
        );
        assert_eq!(
            Backing::parse("/tmp/bus"),
            Backing::File(PathBuf::from("/tmp/bus"))
        );
        assert_eq!(
            Backing::parse("relative/bus"),
            Backing::File(PathBuf::from("relative/bus"))
        );
        assert_eq!(Backing::parse("bus"), Backing::File(PathBuf::from("bus")));
        // A bare "/" is not a valid shm name.
        assert_eq!(Backing::parse("/"), Backing::File(PathBuf::from("/")));
    }

    #[test]
    fn create_rejects_bad_geometry() {
        let backing = Backing::File(PathBuf::from("/nonexistent-dir/never-created"));
        let err = Region::create(&backing, 0, 64).unwrap_err();
        assert!(matches!(err, SplinterError::BadGeometry { .. }));
        let err = Region::create(&backing, 16, 0).unwrap_err();
        assert!(matches!(err, SplinterError::BadGeometry { .. }));
    }

    #[test]
    fn file_backed_create_open_unlink() {
        let dir = tempfile::tempdir().unwrap();
        let backing = Backing::File(dir.path().join("region.splinter"));

        let region = Region::create(&backing, 16, 64).unwrap();
        assert_eq!(region.len(), layout::total_bytes(16, 64));
        drop(region);

        // Exclusive creation refuses to clobber.
        let err = Region::create(&backing, 16, 64).unwrap_err();
        assert!(matches!(err, SplinterError::StoreExists { .. }));

        let region = Region::open(&backing).unwrap();
        assert_eq!(region.len(), layout::total_bytes(16, 64));
        drop(region);

        Region::unlink(&backing).unwrap();
        let err = Region::open(&backing).unwrap_err();
        assert!(matches!(err, SplinterError::StoreNotFound { .. }));
    }

    #[test]
    fn open_rejects_foreign_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-region");
        std::fs::write(&path, vec![0u8; HEADER_SIZE]).unwrap();

        let err = Region::open(&Backing::File(path)).unwrap_err();
        assert!(matches!(err, SplinterError::BadMagic { found: 0 }));
    }

    #[test]
    fn open_rejects_wrong_version() {
        let dir = tempfile::tempdir().unwrap();
        let backing = Backing::File(dir.path().join("versioned"));
        drop(Region::create(&backing, 4, 32).unwrap());

        // Corrupt the version field in place (offset 4).
        let raw = {
            let mut bytes = std::fs::read(backing.display_path()).unwrap();
            bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
            bytes
        };
        std::fs::write(backing.display_path(), raw).unwrap();

        let err = Region::open(&backing).unwrap_err();
        assert!(matches!(
            err,
            SplinterError::BadVersion {
                found: 99,
                expected: LAYOUT_VERSION
            }
        ));
    }

    #[test]
    fn open_rejects_truncated_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let backing = Backing::File(dir.path().join("short"));
        drop(Region::create(&backing, 4, 32).unwrap());

        let file = OpenOptions::new()
            .write(true)
            .open(backing.display_path())
            .unwrap();
        file.set_len((layout::total_bytes(4, 32) - 1) as u64).unwrap();
        drop(file);

        let err = Region::open(&backing).unwrap_err();
        assert!(matches!(err, SplinterError::TruncatedRegion { .. }));
    }

    #[test]
    fn open_or_create_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backing = Backing::File(dir.path().join("ooc"));

        let first = Region::open_or_create(&backing, 8, 32).unwrap();
        drop(first);
        let second = Region::open_or_create(&backing, 8, 32).unwrap();
        assert_eq!(second.len(), layout::total_bytes(8, 32));

        let third = Region::create_or_open(&backing, 8, 32).unwrap();
        assert_eq!(third.len(), layout::total_bytes(8, 32));
    }
}
