//! Embedding vectors: fixed-dimension float publication per slot.
//!
//! The embedding area is a fixed per-slot region distinct from the value
//! arena; it never consumes `val_off`/`val_len`. Writes run under the
//! slot's seqlock with a release fence before the epoch returns to even,
//! and reads mirror the torn-read protocol, since a 3 KiB vector copy is
//! exactly where tearing would bite.

use std::sync::atomic::{Ordering, fence};

use splinter_error::{Result, SplinterError};
use splinter_types::EMBED_DIM;

use crate::seqlock::{self, SlotWriteGuard};
use crate::store::Splinter;

impl Splinter {
    /// Publish an embedding vector for `key`.
    pub fn set_embedding(&self, key: &str, vec: &[f32; EMBED_DIM]) -> Result<()> {
        let slot = self.find(key)?;
        let guard = SlotWriteGuard::try_acquire(slot).ok_or(SplinterError::Busy)?;

        // SAFETY: seqlock held.
        unsafe { slot.store_embedding(vec) };

        // All vector bytes reach memory before the epoch goes even again.
        fence(Ordering::Release);
        guard.commit();
        self.pulse_watchers(slot);
        self.bump_global_epoch();
        Ok(())
    }

    /// Copy `key`'s embedding vector into `out`.
    pub fn get_embedding(&self, key: &str, out: &mut [f32; EMBED_DIM]) -> Result<()> {
        let slot = self.find(key)?;

        let Some(start) = seqlock::read_begin(slot) else {
            seqlock::note_retry("get_embedding");
            return Err(SplinterError::Busy);
        };

        slot.embedding_snapshot(out);

        if seqlock::read_validate(slot, start) {
            seqlock::note_read("get_embedding");
            Ok(())
        } else {
            seqlock::note_retry("get_embedding");
            Err(SplinterError::TornRead)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::store::teststore::store;
    use splinter_types::EMBED_DIM;

    #[test]
    fn embedding_round_trip() {
        let (_dir, store) = store(4, 64);
        store.set("vec", b"v").unwrap();

        let mut vec = [0f32; EMBED_DIM];
        for (i, v) in vec.iter_mut().enumerate() {
            *v = i as f32 * 0.5;
        }
        store.set_embedding("vec", &vec).unwrap();

        let mut out = [0f32; EMBED_DIM];
        store.get_embedding("vec", &mut out).unwrap();
        assert_eq!(vec, out);
    }

    #[test]
    fn embedding_write_advances_epochs() {
        let (_dir, store) = store(4, 64);
        store.set("vec", b"v").unwrap();

        let slot_before = store.slot_epoch("vec").unwrap();
        let global_before = store.global_epoch();
        store.set_embedding("vec", &[1.0f32; EMBED_DIM]).unwrap();
        assert_eq!(store.slot_epoch("vec").unwrap(), slot_before + 2);
        assert!(store.global_epoch() > global_before);
    }

    #[test]
    fn embedding_does_not_touch_the_value() {
        let (_dir, store) = store(4, 64);
        store.set("vec", b"payload").unwrap();
        store.set_embedding("vec", &[2.5f32; EMBED_DIM]).unwrap();

        let mut buf = [0u8; 64];
        let n = store.get("vec", &mut buf).unwrap();
        assert_eq!(&buf[..n], b"payload");
    }

    #[test]
    fn missing_key_is_reported() {
        let (_dir, store) = store(4, 64);
        let mut out = [0f32; EMBED_DIM];
        assert!(store.get_embedding("ghost", &mut out).is_err());
        assert!(store.set_embedding("ghost", &out).is_err());
    }

    #[test]
    fn snapshot_carries_the_vector() {
        let (_dir, store) = store(4, 64);
        store.set("vec", b"v").unwrap();
        store.set_embedding("vec", &[0.25f32; EMBED_DIM]).unwrap();

        let snap = store.slot_snapshot("vec").unwrap();
        assert_eq!(snap.embedding.len(), EMBED_DIM);
        assert!(snap.embedding.iter().all(|&v| v == 0.25));
    }
}
