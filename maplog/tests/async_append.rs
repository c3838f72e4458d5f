use maplog::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

// 2026-10-18T14:35:10Z
const NOW: u64 = 1_792_334_110;

fn builder(dir: &Path) -> Builder {
    Config::builder(dir, "demo")
        .head_info("demo 1.0")
        .clock(Arc::new(ManualClock::from_unix_secs(NOW)))
        .cleanup_delay(None)
        .promote_delay(None)
        .console_log(false)
}

fn xlogs(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|n| n.ends_with(".xlog"))
        .collect();
    names.sort();
    names
}

#[test]
fn hundred_records() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(builder(dir.path()).build().unwrap()).unwrap();
    assert_eq!(engine.mode(), Mode::Async);

    let mut expected = String::from("demo 1.0\n");
    for i in 0..100 {
        let record = format!("record {}\n", i);
        engine.append(SeverityKey::new(3), record.as_bytes());
        expected.push_str(&record);
    }
    engine.flush_sync();
    engine.close();

    assert_eq!(
        xlogs(dir.path()),
        vec!["demo_20261018140000.xlog", "demo_20261018140003.xlog"]
    );
    let contents = fs::read_to_string(dir.path().join("demo_20261018140003.xlog")).unwrap();
    assert_eq!(contents, expected);

    let banner = fs::read_to_string(dir.path().join("demo_20261018140000.xlog")).unwrap();
    assert!(banner.starts_with("demo 1.0\nget mmap time: "));

    let stats = engine.stats();
    assert_eq!(stats.appended, 100);
    assert_eq!(stats.overflow, 0);
    assert_eq!(stats.write_failed, 0);
}

#[test]
fn per_key_ordering_under_contention() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(Engine::open(builder(dir.path()).build().unwrap()).unwrap());

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let engine = engine.clone();
            thread::spawn(move || {
                for seq in 0..500 {
                    let record = format!("t{} {}\n", t, seq);
                    engine.append(SeverityKey::new(2), record.as_bytes());
                }
            })
        })
        .collect();
    let flusher = {
        let engine = engine.clone();
        thread::spawn(move || {
            for _ in 0..50 {
                engine.flush_sync();
                engine.flush();
            }
        })
    };
    for w in writers {
        w.join().unwrap();
    }
    flusher.join().unwrap();
    engine.close();

    let contents = fs::read_to_string(dir.path().join("demo_20261018140002.xlog")).unwrap();
    let mut next = [0u32; 4];
    for line in contents.lines().skip(1) {
        let (thread, seq) = line.split_once(' ').unwrap();
        let t: usize = thread[1..].parse().unwrap();
        let seq: u32 = seq.parse().unwrap();
        assert_eq!(seq, next[t], "thread {} out of order", t);
        next[t] += 1;
    }
    assert_eq!(next, [500; 4]);
}

#[test]
fn size_limit_splits_files() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(builder(dir.path()).head_info("h").build().unwrap()).unwrap();
    engine.set_max_file_size(64);

    let record = [b'x'; 39];
    for _ in 0..5 {
        let mut line = record.to_vec();
        line.push(b'\n');
        engine.append(SeverityKey::new(1), &line);
        engine.flush_sync();
    }
    engine.close();

    let names: Vec<String> = xlogs(dir.path())
        .into_iter()
        .filter(|n| n.starts_with("demo_20261018140001"))
        .collect();
    assert_eq!(
        names,
        vec![
            "demo_20261018140001.xlog",
            "demo_20261018140001_1.xlog",
            "demo_20261018140001_2.xlog",
        ]
    );
    let last = fs::read_to_string(dir.path().join("demo_20261018140001_2.xlog")).unwrap();
    assert_eq!(last.len(), 2 + 40);
}

#[test]
fn hour_change_starts_a_new_file() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::from_unix_secs(NOW));
    let engine = Engine::open(builder(dir.path()).clock(clock.clone()).build().unwrap()).unwrap();

    engine.append(SeverityKey::new(1), b"first hour\n");
    engine.flush_sync();
    engine.append(SeverityKey::new(1), b"still first hour\n");
    engine.flush_sync();
    clock.advance(core::time::Duration::from_secs(3600));
    engine.append(SeverityKey::new(1), b"second hour\n");
    engine.flush_sync();
    engine.close();

    let first = fs::read_to_string(dir.path().join("demo_20261018140001.xlog")).unwrap();
    assert_eq!(first, "demo 1.0\nfirst hour\nstill first hour\n");
    let second = fs::read_to_string(dir.path().join("demo_20261018150001.xlog")).unwrap();
    assert_eq!(second, "demo 1.0\nsecond hour\n");
}

#[test]
fn level_filter() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(
        builder(dir.path())
            .mode(Mode::Sync)
            .level(SeverityKey::new(2))
            .build()
            .unwrap(),
    )
    .unwrap();

    engine.append(SeverityKey::new(1), b"debug\n");
    engine.append(SeverityKey::new(2), b"info\n");
    engine.set_level(SeverityKey::DEFAULT);
    engine.append(SeverityKey::new(1), b"debug again\n");
    engine.close();

    let debug = fs::read_to_string(dir.path().join("demo_20261018140001.xlog")).unwrap();
    assert_eq!(debug, "demo 1.0\ndebug again\n");
    assert!(dir.path().join("demo_20261018140002.xlog").exists());
}
