//! Behavioural contract shared by every `Env` implementation.
//!
//! Each check takes an environment and a scratch directory (which must
//! exist) and panics with a descriptive message on violation. Running the
//! same checks against `HostEnv` and `InMemoryEnv` keeps the two in step.

use crate::fixtures::join;
use std::io;
use std::sync::mpsc;
use std::time::Duration;
use stratum_env::{env_log, Env, EnvExt, ErrorKind};

/// Writes `len` bytes through a writable file and reads them back through
/// a fresh random-access file at offset 0.
pub fn check_write_then_read(env: &dyn Env, root: &str, len: usize) {
    let fname = join(root, &format!("write-read-{len}"));
    let data: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();

    let mut file = env.new_writable_file(&fname).expect("Failed to create file");
    file.append(&data).expect("Failed to append");
    file.flush().expect("Failed to flush");

    let reader = env.new_random_access_file(&fname).expect("Failed to open reader");
    let mut scratch = vec![0u8; len + 16];
    let got = reader.read(0, len + 16, &mut scratch).expect("Failed to read");
    assert_eq!(got.len(), len, "short read of {len} bytes");
    assert!(got == &data[..], "data mismatch for {len} bytes");

    file.close().expect("Failed to close");
    env.delete_file(&fname).expect("Failed to delete");
}

/// Two appendable handles on one file lose no bytes.
pub fn check_two_appenders(env: &dyn Env, root: &str) {
    let fname = join(root, "shared.log");

    let mut first = env.new_appendable_file(&fname).expect("Failed to open first");
    let mut second = env.new_appendable_file(&fname).expect("Failed to open second");
    first.append(b"a").expect("Failed to append a");
    second.append(b"b").expect("Failed to append b");
    drop(first);
    drop(second);

    assert_eq!(env.read_file_to_vec(&fname).expect("Failed to read"), b"ab");
}

/// Truncate mode discards prior contents; append mode keeps them.
pub fn check_open_modes(env: &dyn Env, root: &str) {
    let fname = join(root, "MANIFEST-000001");

    env.write_string_to_file(b"first", &fname, false)
        .expect("Failed to write");
    let mut appender = env.new_appendable_file(&fname).expect("Failed to open appender");
    appender.append(b"+more").expect("Failed to append");
    appender.close().expect("Failed to close");
    assert_eq!(env.read_file_to_vec(&fname).unwrap(), b"first+more");

    env.write_string_to_file(b"second", &fname, true)
        .expect("Failed to rewrite");
    assert_eq!(env.read_file_to_vec(&fname).unwrap(), b"second");
}

/// A held lock cannot be taken again until released.
pub fn check_lock_exclusion(env: &dyn Env, root: &str) {
    let fname = join(root, "LOCK");

    let lock = env.lock_file(&fname).expect("Failed to lock");
    let err = env.lock_file(&fname).expect_err("Lock must not be reentrant");
    assert_eq!(err.kind(), ErrorKind::IoError);

    env.unlock_file(lock).expect("Failed to unlock");
    let lock = env.lock_file(&fname).expect("Failed to relock after release");
    env.unlock_file(lock).expect("Failed to unlock");
}

/// Nested directories are created in one call, and again without error.
pub fn check_create_dir_recursive(env: &dyn Env, root: &str) {
    let a = join(root, "a");
    let b = join(&a, "b");
    let c = join(&b, "c");

    env.create_dir(&c).expect("Failed to create nested directories");
    for dir in [&a, &b, &c] {
        assert!(env.file_exists(dir), "{dir} was not created");
    }
    env.create_dir(&c).expect("Creating an existing directory must succeed");

    env.delete_dir(&c).expect("Failed to delete c");
    env.delete_dir(&b).expect("Failed to delete b");
    env.delete_dir(&a).expect("Failed to delete a");
    assert!(!env.file_exists(&a));
}

/// Listing a directory returns exactly its children.
pub fn check_children(env: &dyn Env, root: &str) {
    let dir = join(root, "children");
    env.create_dir(&dir).expect("Failed to create directory");
    for name in ["x", "y", "z"] {
        env.write_string_to_file(b"", &join(&dir, name), false)
            .expect("Failed to create child");
    }

    let mut names = env.get_children(&dir).expect("Failed to list children");
    names.sort();
    assert_eq!(names, vec!["x", "y", "z"]);

    assert!(env.delete_dir(&dir).is_err(), "non-empty directory was deleted");
    let err = env
        .get_children(&join(root, "no-such-dir"))
        .expect_err("Listing a missing directory must fail");
    assert_eq!(err.kind(), ErrorKind::IoError);
}

/// File size reports exactly the bytes written.
pub fn check_file_size(env: &dyn Env, root: &str) {
    let fname = join(root, "000005.sst");
    env.write_string_to_file(&[0x5a; 12_345], &fname, true)
        .expect("Failed to write");
    assert_eq!(env.get_file_size(&fname).unwrap(), 12_345);
}

/// Renaming onto an existing file replaces it.
pub fn check_rename(env: &dyn Env, root: &str) {
    let tmp = join(root, "CURRENT.dbtmp");
    let current = join(root, "CURRENT");

    env.write_string_to_file(b"MANIFEST-000001\n", &current, false)
        .expect("Failed to write CURRENT");
    env.write_string_to_file(b"MANIFEST-000002\n", &tmp, true)
        .expect("Failed to write temp");
    env.rename_file(&tmp, &current).expect("Failed to rename");

    assert!(!env.file_exists(&tmp));
    assert_eq!(env.read_file_to_vec(&current).unwrap(), b"MANIFEST-000002\n");
}

/// Operations on missing entries report `NotFound`.
pub fn check_not_found(env: &dyn Env, root: &str) {
    let missing = join(root, "missing");

    assert!(!env.file_exists(&missing));
    let errors = [
        env.new_sequential_file(&missing).map(|_| ()).unwrap_err(),
        env.new_random_access_file(&missing).map(|_| ()).unwrap_err(),
        env.delete_file(&missing).unwrap_err(),
        env.get_file_size(&missing).unwrap_err(),
    ];
    for err in errors {
        assert_eq!(err.kind(), ErrorKind::NotFound, "unexpected error: {err}");
        assert_eq!(err.host_error().kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("missing"));
    }
}

/// Info log records are newline terminated, with long messages intact.
pub fn check_logger(env: &dyn Env, root: &str) {
    let fname = join(root, "LOG");
    let logger = env.new_logger(&fname).expect("Failed to create logger");
    env_log!(logger, "Recovering log #{}", 7);
    env_log!(logger, "{}", "k".repeat(10_000));
    env_log!(logger, "{}", "t".repeat(100_000));
    env_log!(logger, "Delete type=0 #{}\n", 3);
    drop(logger);

    let text = String::from_utf8(env.read_file_to_vec(&fname).unwrap()).unwrap();
    let lines: Vec<&str> = text.split_terminator('\n').collect();
    assert_eq!(lines.len(), 4, "expected one line per record");
    assert!(lines[0].ends_with(" Recovering log #7"));
    assert!(lines[1].ends_with(&"k".repeat(10_000)));
    assert!(lines[2].len() < 100_000);
    assert!(lines[3].ends_with(" Delete type=0 #3"));
}

/// Scheduled jobs and started threads run.
pub fn check_background_work(env: &dyn Env) {
    fn report(arg: (mpsc::Sender<&'static str>, &'static str)) {
        let (tx, label) = arg;
        let _ = tx.send(label);
    }

    let (tx, rx) = mpsc::channel();
    env.schedule_fn(report, (tx.clone(), "scheduled"));
    env.start_thread_fn(report, (tx, "thread"));

    let mut seen: Vec<&str> = (0..2)
        .map(|_| {
            rx.recv_timeout(Duration::from_secs(10))
                .expect("Background work did not run")
        })
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, vec!["scheduled", "thread"]);
}

/// Runs every check.
pub fn run_all(env: &dyn Env, root: &str) {
    for len in [0, 1, 4095, 4096, 65_537, 1 << 20] {
        check_write_then_read(env, root, len);
    }
    check_two_appenders(env, root);
    check_open_modes(env, root);
    check_lock_exclusion(env, root);
    check_create_dir_recursive(env, root);
    check_children(env, root);
    check_file_size(env, root);
    check_rename(env, root);
    check_not_found(env, root);
    check_logger(env, root);
    check_background_work(env);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{init_test_tracing, with_host_env, with_memory_env};

    #[test]
    fn host_env_meets_contract() {
        init_test_tracing();
        with_host_env(run_all);
    }

    #[test]
    fn memory_env_meets_contract() {
        init_test_tracing();
        with_memory_env(run_all);
    }

    #[test]
    fn default_env_meets_contract() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().to_string_lossy().into_owned();
        run_all(stratum_env::default_env(), &root);
    }
}
