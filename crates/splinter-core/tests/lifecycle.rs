//! End-to-end store lifecycle: create, bind, read, unbind, reopen.

use splinter_core::{Backing, Splinter};
use splinter_error::SplinterError;

fn scratch(slots: u32, max_val_sz: u32) -> (tempfile::TempDir, Backing, Splinter) {
    let dir = tempfile::tempdir().unwrap();
    let backing = Backing::File(dir.path().join("bus.splinter"));
    let store = Splinter::create(&backing, slots, max_val_sz).unwrap();
    (dir, backing, store)
}

#[test]
fn create_set_get_unset() {
    let (_dir, _backing, store) = scratch(16, 64);

    store.set("alpha", b"hi").unwrap();

    let mut buf = [0u8; 64];
    let n = store.get("alpha", &mut buf).unwrap();
    assert_eq!(n, 2);
    assert_eq!(&buf[..2], b"hi");

    assert_eq!(store.unset("alpha").unwrap(), 2);
    assert!(matches!(
        store.get("alpha", &mut buf).unwrap_err(),
        SplinterError::KeyNotFound { .. }
    ));
}

#[test]
fn oversize_payload_is_rejected_without_binding() {
    let (_dir, _backing, store) = scratch(16, 64);

    let payload = vec![0xabu8; 65];
    assert!(matches!(
        store.set("beta", &payload).unwrap_err(),
        SplinterError::ValueSize { len: 65, max: 64 }
    ));
    assert!(matches!(
        store.get("beta", &mut [0u8; 64]).unwrap_err(),
        SplinterError::KeyNotFound { .. }
    ));
}

#[test]
fn values_survive_reopen_of_a_file_backed_region() {
    let (_dir, backing, store) = scratch(16, 64);
    store.set("persist", b"across-reopen").unwrap();
    store.set_label("persist", 1 << 12).unwrap();
    drop(store);

    let reopened = Splinter::open(&backing).unwrap();
    let mut buf = [0u8; 64];
    let n = reopened.get("persist", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"across-reopen");
    assert_eq!(reopened.slot_snapshot("persist").unwrap().bloom, 1 << 12);
}

#[test]
fn two_handles_share_one_region() {
    // Two mappings of the same backing object stand in for two processes.
    let (_dir, backing, writer) = scratch(16, 64);
    let reader = Splinter::open(&backing).unwrap();

    writer.set("shared", b"first").unwrap();
    let mut buf = [0u8; 64];
    let n = reader.get("shared", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"first");

    let before = reader.global_epoch();
    writer.set("shared", b"second").unwrap();
    assert!(reader.global_epoch() > before);
    let n = reader.get("shared", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"second");

    // Flags are shared header state, visible in both directions.
    reader.set_av(true);
    assert!(writer.auto_scrub());
}

#[test]
fn shm_backed_mode_round_trip() {
    let name = format!("/splinter-test-{}", std::process::id());
    let backing = Backing::parse(&name);
    assert!(matches!(backing, Backing::Shm(_)));

    let store = Splinter::create(&backing, 8, 32).unwrap();
    store.set("k", b"shm").unwrap();

    let second = Splinter::open(&backing).unwrap();
    let mut buf = [0u8; 32];
    let n = second.get("k", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"shm");

    drop(store);
    drop(second);
    splinter_core::Region::unlink(&backing).unwrap();
    assert!(matches!(
        Splinter::open(&backing).unwrap_err(),
        SplinterError::StoreNotFound { .. }
    ));
}

#[test]
fn colliding_keys_coexist_via_linear_probing() {
    // One slot's worth of hash space: every key collides at index 0.
    let (_dir, _backing, store) = scratch(1, 64);
    store.set("only", b"v").unwrap();
    assert!(matches!(
        store.set("other", b"w").unwrap_err(),
        SplinterError::StoreFull
    ));

    // With more slots the probe walk finds homes for all of them.
    let (_dir2, _backing2, store) = scratch(4, 64);
    for key in ["a", "b", "c", "d"] {
        store.set(key, key.as_bytes()).unwrap();
    }
    let mut keys = store.keys();
    keys.sort();
    assert_eq!(keys, ["a", "b", "c", "d"]);
}

#[test]
fn deletion_does_not_hide_later_probe_positions() {
    let (_dir, _backing, store) = scratch(8, 64);
    for key in ["k1", "k2", "k3", "k4", "k5"] {
        store.set(key, b"v").unwrap();
    }
    store.unset("k2").unwrap();

    // Every survivor is still reachable even if its probe path crossed
    // the freed slot.
    for key in ["k1", "k3", "k4", "k5"] {
        assert_eq!(store.value_len(key).unwrap(), 1);
    }

    // Re-inserting the deleted key lands it back on its original path.
    store.set("k2", b"back").unwrap();
    assert_eq!(store.value_len("k2").unwrap(), 4);
}

#[test]
fn scrub_policy_zeroes_stale_tails() {
    let (_dir, _backing, store) = scratch(4, 64);

    // Without scrub, the tail beyond a shrunk value keeps old bytes.
    store.set("k", &[0xff; 64]).unwrap();
    store.set("k", &[0x11; 4]).unwrap();
    let raw = store.raw_value("k").unwrap();
    let tail = unsafe { std::slice::from_raw_parts(raw.as_ptr().add(4), 60) };
    assert!(tail.iter().any(|&b| b == 0xff));

    // Full scrub wipes the whole partition before the next write.
    store.set_av(true);
    store.set("k", &[0x22; 4]).unwrap();
    let raw = store.raw_value("k").unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(raw.as_ptr(), 64) };
    assert_eq!(&bytes[..4], &[0x22; 4]);
    assert_eq!(&bytes[4..], &[0u8; 60]);
}

#[test]
fn hybrid_scrub_zeroes_a_rounded_prefix() {
    let (_dir, _backing, store) = scratch(4, 256);

    store.set("k", &[0xee; 256]).unwrap();
    store.set_hybrid_av();
    assert!(store.auto_scrub() && store.hybrid_scrub());

    // 10 bytes round up to one 64-byte line; bytes past it keep history.
    store.set("k", &[0x33; 10]).unwrap();
    let raw = store.raw_value("k").unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(raw.as_ptr(), 256) };
    assert_eq!(&bytes[..10], &[0x33; 10]);
    assert_eq!(&bytes[10..64], &[0u8; 54]);
    assert_eq!(&bytes[64..], &[0xee; 192]);
}
