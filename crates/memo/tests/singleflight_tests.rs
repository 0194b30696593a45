//! Concurrency tests for singleflight construction

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use inrepo_memo::{BoxError, MemoCache};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("inrepo_memo=trace")
        .try_init();
}

#[test]
fn test_same_key_runs_constructor_once() {
    init_tracing();
    let cache = Arc::new(MemoCache::<String, u32>::new(8).unwrap());
    let calls = Arc::new(AtomicUsize::new(0));
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let leader = {
        let cache = Arc::clone(&cache);
        let calls = Arc::clone(&calls);
        thread::spawn(move || {
            cache.get_or_add("foo/bar".to_string(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                Ok::<_, BoxError>(42)
            })
        })
    };
    started_rx.recv().unwrap();

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            thread::spawn(move || {
                cache.get_or_add("foo/bar".to_string(), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(0)
                })
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    release_tx.send(()).unwrap();

    assert_eq!(leader.join().unwrap().unwrap(), 42);
    for waiter in waiters {
        assert_eq!(waiter.join().unwrap().unwrap(), 42);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);

    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits + stats.coalesced, 8);
}

#[test]
fn test_waiters_share_constructor_error() {
    let cache = Arc::new(MemoCache::<&'static str, u32>::new(2).unwrap());
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let leader = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            cache.get_or_add("key", || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                Err::<u32, BoxError>("clone failed".into())
            })
        })
    };
    started_rx.recv().unwrap();

    // A waiter that arrives while the construction is in flight gets the
    // shared error; one that arrives after it failed constructs its own
    // value. Both are valid, and neither may leave a failure cached.
    let waiter = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.get_or_add("key", || Ok::<_, BoxError>(5)))
    };

    thread::sleep(Duration::from_millis(50));
    release_tx.send(()).unwrap();

    assert_eq!(leader.join().unwrap().unwrap_err().to_string(), "clone failed");
    match waiter.join().unwrap() {
        Ok(value) => {
            assert_eq!(value, 5);
            assert_eq!(cache.len(), 1);
        }
        Err(err) => {
            assert_eq!(err.to_string(), "clone failed");
            assert_eq!(cache.len(), 0);
        }
    }
}

#[test]
fn test_different_keys_do_not_serialize() {
    init_tracing();
    let cache = Arc::new(MemoCache::<&'static str, u32>::new(8).unwrap());
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let slow = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            cache.get_or_add("slow", || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                Ok::<_, BoxError>(1)
            })
        })
    };
    started_rx.recv().unwrap();

    // "slow" is still constructing; "fast" must complete without waiting on it
    assert_eq!(cache.get_or_add("fast", || Ok::<_, BoxError>(2)).unwrap(), 2);
    assert!(cache.contains(&"fast"));
    assert!(!cache.contains(&"slow"));

    release_tx.send(()).unwrap();
    assert_eq!(slow.join().unwrap().unwrap(), 1);
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_many_threads_many_keys() {
    let cache = Arc::new(MemoCache::<u32, u32>::new(4).unwrap());
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16u32)
        .map(|i| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let key = i % 4;
                cache.get_or_add(key, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    Ok::<_, BoxError>(key * 10)
                })
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let key = u32::try_from(i).unwrap() % 4;
        assert_eq!(handle.join().unwrap().unwrap(), key * 10);
    }

    // Capacity covers every key, so each one is constructed exactly once
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(cache.len(), 4);
}

#[test]
fn test_panicking_constructor_is_abandoned() {
    init_tracing();
    let cache = Arc::new(MemoCache::<&'static str, u32>::new(2).unwrap());

    let panicked = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            cache.get_or_add("key", || -> Result<u32, BoxError> {
                panic!("constructor exploded");
            })
        })
    };
    assert!(panicked.join().is_err());
    assert_eq!(cache.len(), 0);

    // The abandoned slot must not block later callers
    assert_eq!(cache.get_or_add("key", || Ok::<_, BoxError>(9)).unwrap(), 9);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_waiter_takes_over_after_panic() {
    let cache = Arc::new(MemoCache::<&'static str, u32>::new(2).unwrap());
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let leader = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            cache.get_or_add("key", || -> Result<u32, BoxError> {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                panic!("constructor exploded");
            })
        })
    };
    started_rx.recv().unwrap();

    let waiter = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.get_or_add("key", || Ok::<_, BoxError>(11)))
    };

    thread::sleep(Duration::from_millis(50));
    release_tx.send(()).unwrap();

    assert!(leader.join().is_err());
    assert_eq!(waiter.join().unwrap().unwrap(), 11);
    assert!(cache.contains(&"key"));
}

#[test]
fn test_purge_during_construction() {
    let cache = Arc::new(MemoCache::<&'static str, u32>::new(2).unwrap());
    cache.get_or_add("old", || Ok::<_, BoxError>(1)).unwrap();

    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let builder = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            cache.get_or_add("new", || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                Ok::<_, BoxError>(2)
            })
        })
    };
    started_rx.recv().unwrap();

    cache.purge();
    assert_eq!(cache.len(), 0);

    release_tx.send(()).unwrap();
    assert_eq!(builder.join().unwrap().unwrap(), 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.contains(&"new"));
}
