//! Property-based test generators using proptest.
//!
//! Provides strategies for generating file names, caller paths and
//! payloads in the shapes a storage engine actually uses.

use proptest::prelude::*;

/// Strategy for generating a single file name component.
pub fn file_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9_][a-zA-Z0-9_.-]{0,23}")
        .expect("Invalid regex")
        .prop_filter("File name must not be a dot entry", |s| s != "." && s != "..")
}

/// Strategy for generating engine-style file names such as `000123.log`.
pub fn numbered_file_strategy() -> impl Strategy<Value = String> {
    (1u64..1_000_000, prop::sample::select(vec!["log", "sst", "ldb", "dbtmp"]))
        .prop_map(|(number, suffix)| format!("{number:06}.{suffix}"))
}

/// Strategy for generating rooted caller paths using either separator.
pub fn rooted_path_strategy() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(file_name_strategy(), 1..5),
        prop::collection::vec(prop::bool::ANY, 5),
    )
        .prop_map(|(segments, use_alt)| {
            let mut path = String::new();
            for (i, segment) in segments.iter().enumerate() {
                path.push(if use_alt[i] { '/' } else { '\\' });
                path.push_str(segment);
            }
            path
        })
}

/// Strategy for generating payloads, including empty and multi-buffer sizes.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        Just(Vec::new()),
        prop::collection::vec(any::<u8>(), 1..1024),
        (4096usize..200_000).prop_map(|len| (0..len).map(|i| (i * 131 % 251) as u8).collect()),
    ]
}

/// Strategy for generating info log messages of every length class.
pub fn log_message_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[ -~]{0,200}").expect("Invalid regex"),
        (500usize..20_000).prop_map(|len| "m".repeat(len)),
        (30_000usize..60_000).prop_map(|len| "t".repeat(len)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn numbered_files_are_padded() {
        let mut runner = TestRunner::default();
        for _ in 0..20 {
            let name = numbered_file_strategy()
                .new_tree(&mut runner)
                .unwrap()
                .current();
            let (number, _) = name.split_once('.').unwrap();
            assert!(number.len() >= 6);
            assert!(number.chars().all(|c| c.is_ascii_digit()));
        }
    }

    proptest! {
        #[test]
        fn rooted_paths_start_with_separator(path in rooted_path_strategy()) {
            prop_assert!(path.starts_with('/') || path.starts_with('\\'));
        }

        #[test]
        fn file_names_have_no_separators(name in file_name_strategy()) {
            prop_assert!(!name.contains('/') && !name.contains('\\'));
        }
    }
}
