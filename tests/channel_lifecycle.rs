//! End-to-end channel tests against a real backing directory.

use std::fs;
use std::sync::Arc;
use std::thread;

use tempfile::tempdir;
use vfs_channel::{
    CacheController, ChannelState, FsChannel, InProcessChannel, LocalDirDispatcher, RelativePath,
    VfsError,
};

fn path(raw: &str) -> RelativePath {
    RelativePath::new(raw).unwrap()
}

/// Verify the owner-side sequence: start, invalidate after external
/// mutations, stop, await completion.
#[tokio::test]
async fn test_owner_sequence_over_local_directory() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("readme.md"), b"v1").unwrap();

    let channel = InProcessChannel::new(LocalDirDispatcher::new(temp_dir.path()), 64);
    let stop_before = channel.stop_future();
    assert_eq!(channel.state(), ChannelState::Idle);
    channel.start(false, true).unwrap();

    let readme = path("readme.md");
    assert_eq!(channel.read(&readme).unwrap().as_slice(), b"v1");

    // Checkout changes the file behind the channel.
    fs::write(temp_dir.path().join("readme.md"), b"version two").unwrap();
    assert_eq!(channel.read(&readme).unwrap().as_slice(), b"v1");
    channel.remove_cached_file(&readme).unwrap();
    assert_eq!(channel.read(&readme).unwrap().as_slice(), b"version two");

    // A path that did not exist appears after a checkout.
    let added = path("src/lib.rs");
    assert!(channel.lookup(&added).unwrap().is_none());
    fs::create_dir_all(temp_dir.path().join("src")).unwrap();
    fs::write(temp_dir.path().join("src/lib.rs"), b"//").unwrap();
    assert!(channel.lookup(&added).unwrap().is_none());
    channel.flush_negative_path_cache().unwrap();
    assert_eq!(channel.lookup(&added).unwrap().unwrap().size, 2);

    channel.stop().unwrap();
    let err = channel.stop().unwrap_err();
    assert!(err.is_lifecycle_violation());

    let stop_after = channel.stop_future();
    let first = stop_before.await.unwrap();
    let second = stop_after.await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.requests_serviced, 6);
    assert_eq!(channel.state(), ChannelState::Stopped);
}

/// Verify a read-only mount never touches the backing directory.
#[test]
fn test_read_only_mount() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let channel = InProcessChannel::new(LocalDirDispatcher::new(temp_dir.path()), 8);
    channel.start(true, false).unwrap();

    let err = channel.write(&path("new.txt"), b"data").unwrap_err();
    assert!(matches!(err, VfsError::ReadOnly(_)));
    assert!(!temp_dir.path().join("new.txt").exists());
}

/// Verify placeholders let lazily-populated directories resolve.
#[test]
fn test_placeholder_then_population() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let channel = InProcessChannel::new(LocalDirDispatcher::new(temp_dir.path()), 8);
    channel.start(false, true).unwrap();

    let dir = path("lazy/tree");
    assert!(channel.lookup(&dir).unwrap().is_none());
    channel.add_directory_placeholder(&dir).unwrap();
    assert!(channel.lookup(&dir).unwrap().unwrap().is_dir());

    // Population happens through the channel itself.
    let child = path("lazy/tree/file.txt");
    channel.write(&child, b"populated").unwrap();
    assert_eq!(channel.read(&child).unwrap().as_slice(), b"populated");
    assert!(temp_dir.path().join("lazy/tree/file.txt").exists());
}

/// Verify invalidations from the owner thread interleave safely with driver
/// threads hammering lookups.
#[test]
fn test_invalidation_concurrent_with_requests() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    for n in 0..16 {
        fs::write(temp_dir.path().join(format!("f{}", n)), vec![0u8; n]).unwrap();
    }
    let channel = Arc::new(InProcessChannel::new(LocalDirDispatcher::new(temp_dir.path()), 8));
    channel.start(false, true).unwrap();

    let drivers: Vec<_> = (0..4)
        .map(|_| {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                for round in 0..200 {
                    let p = path(&format!("f{}", round % 16));
                    let attr = channel.lookup(&p).unwrap().unwrap();
                    assert_eq!(attr.size, (round % 16) as u64);
                }
            })
        })
        .collect();

    for round in 0..200 {
        channel.remove_cached_file(&path(&format!("f{}", round % 16))).unwrap();
        if round % 50 == 0 {
            channel.flush_negative_path_cache().unwrap();
        }
    }

    for driver in drivers {
        driver.join().unwrap();
    }

    channel.stop().unwrap();
    let stop = channel.stop_future().peek().unwrap();
    assert_eq!(stop.requests_serviced, 800);
}
