//! Property-based tests for ringlog using proptest

use proptest::prelude::*;
use ringlog::core::format::{count_arguments, render};
use ringlog::core::record::Arg;
use ringlog::core::ring_buffer::{self, WriteError};
use ringlog::control::Pattern;
use ringlog::LogLevel;

fn rendered(format: &str, args: &[Arg<'_>]) -> String {
    let mut out = String::new();
    render(format, args, &mut out);
    out
}

// ============================================================================
// Rendering matches std formatting
// ============================================================================

proptest! {
    #[test]
    fn test_signed_integers_match_std(v in any::<i64>()) {
        let args = vec![Arg::I64(v); 5];
        prop_assert_eq!(
            rendered("{} [{:>12}] [{:<12}] [{:^12}] {:+}", &args),
            format!("{} [{:>12}] [{:<12}] [{:^12}] {:+}", v, v, v, v, v)
        );
        prop_assert_eq!(rendered("{:08}", &args[..1]), format!("{:08}", v));
    }

    #[test]
    fn test_narrow_signed_radix_match_std(a in any::<i8>(), b in any::<i16>(), c in any::<i32>()) {
        let args = vec![Arg::I8(a), Arg::I16(b), Arg::I32(c), Arg::I8(a), Arg::I32(c)];
        prop_assert_eq!(
            rendered("{:x} {:#X} {:o} {:#b} {:+}", &args),
            format!("{:x} {:#X} {:o} {:#b} {:+}", a, b, c, a, c)
        );
    }

    #[test]
    fn test_unsigned_radix_match_std(v in any::<u64>()) {
        let args = vec![Arg::U64(v); 5];
        prop_assert_eq!(
            rendered("{:#x} {:X} {:o} {:#b} {:#010x}", &args),
            format!("{:#x} {:X} {:o} {:#b} {:#010x}", v, v, v, v, v)
        );
    }

    #[test]
    fn test_floats_match_std(v in -1.0e9f64..1.0e9f64) {
        let args = vec![Arg::F64(v); 5];
        prop_assert_eq!(
            rendered("{} {:.3} {:+.2} {:10.1} {:e}", &args),
            format!("{} {:.3} {:+.2} {:10.1} {:e}", v, v, v, v, v)
        );
    }

    #[test]
    fn test_strings_match_std(s in "\\PC{0,20}") {
        let args = vec![Arg::Str(&s); 4];
        prop_assert_eq!(
            rendered("{} [{:>10}] [{:-^9}] {:?}", &args),
            format!("{} [{:>10}] [{:-^9}] {:?}", s, s, s, s)
        );
        prop_assert_eq!(rendered("{:.3}", &args[..1]), format!("{:.3}", s));
    }

    #[test]
    fn test_literal_text_passes_through(text in "[^{}]{0,40}") {
        prop_assert_eq!(count_arguments(&text), Ok(0));
        prop_assert_eq!(rendered(&text, &[]), text);
    }

    #[test]
    fn test_placeholder_count(n in 0usize..12, sep in "[a-z ]{0,3}") {
        let format = vec!["{}"; n].join(&sep);
        prop_assert_eq!(count_arguments(&format), Ok(n));
    }
}

// ============================================================================
// Ring buffer
// ============================================================================

proptest! {
    /// Interleaved writes and reads come out in write order, with nothing
    /// lost except writes rejected as full
    #[test]
    fn test_ring_is_fifo(
        ops in prop::collection::vec((0usize..100, any::<bool>()), 1..200),
        capacity in 64usize..1024,
    ) {
        let (mut writer, mut reader) = ring_buffer::channel(capacity);
        let mut expected = std::collections::VecDeque::new();
        let mut next: u32 = 0;

        for (len, read) in ops {
            if read {
                let got = reader.read(|tag, payload| (tag, payload.to_vec()));
                match expected.pop_front() {
                    Some((tag, len)) => {
                        let (got_tag, payload) = got.expect("frame expected");
                        prop_assert_eq!(got_tag, tag);
                        prop_assert_eq!(payload.len(), len);
                        prop_assert!(payload.iter().all(|&b| b == tag as u8));
                    }
                    None => prop_assert!(got.is_none()),
                }
                continue;
            }

            let tag = next;
            match writer.write(tag, len, false, |buf| buf.fill(tag as u8)) {
                Ok(()) => {
                    expected.push_back((tag, len));
                    next += 1;
                }
                Err(WriteError::Full) => {}
                Err(WriteError::TooLarge { .. }) => prop_assert!(len > writer.max_payload()),
                Err(WriteError::Disconnected) => prop_assert!(false, "reader is alive"),
            }
        }

        while let Some((tag, len)) = expected.pop_front() {
            let (got_tag, payload) = reader
                .read(|tag, payload| (tag, payload.to_vec()))
                .expect("frame expected");
            prop_assert_eq!(got_tag, tag);
            prop_assert_eq!(payload.len(), len);
        }
        prop_assert!(reader.is_empty());
    }
}

// ============================================================================
// Levels and patterns
// ============================================================================

proptest! {
    #[test]
    fn test_level_from_u8(value in any::<u8>()) {
        match LogLevel::from_u8(value) {
            Some(level) => prop_assert_eq!(level as u8, value),
            None => prop_assert!(!LogLevel::ALL.iter().any(|l| *l as u8 == value)),
        }
    }

    #[test]
    fn test_star_wildcards(prefix in "[a-z.]{0,8}", rest in "[a-z.]{0,8}") {
        let name = format!("{}{}", prefix, rest);
        let starts = Pattern::wildcard(format!("{}*", prefix)).matcher().unwrap();
        prop_assert!(starts.is_match(&name));
        let ends = Pattern::wildcard(format!("*{}", rest)).matcher().unwrap();
        prop_assert!(ends.is_match(&name));
        let exact = Pattern::wildcard(name.clone()).matcher().unwrap();
        prop_assert!(exact.is_match(&name));
        let longer = format!("{}x", name);
        prop_assert!(!exact.is_match(&longer));
    }
}
